//! [`TypeRef`]: the tagged-union type representation used throughout MIR,
//! enumeration and codegen.
//!
//! Per the design notes, every AST/IR node class in this crate is a single
//! tagged union with an exhaustive `match` at each consumer; `TypeRef` is
//! the canonical example. Adding a variant here means grep-ing for
//! `match.*TypeRef` (or just letting the compiler's exhaustiveness check do
//! it) and updating every visitor: the enumerator's type walk (§4.4), the
//! monomorphiser's substitution, and every codegen emission site.

use std::rc::Rc;
use crate::path::Path;

/// Scalar primitive types. These always have a target-independent layout
/// except for `Isize`/`Usize`, which match the pointer width.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Primitive {
  /// `bool`, one byte, values `0`/`1`.
  Bool,
  /// A Unicode scalar value, four bytes.
  Char,
  I8, I16, I32, I64, I128, Isize,
  U8, U16, U32, U64, U128, Usize,
  F32, F64,
}

impl Primitive {
  /// Byte size of this primitive, for architectures where it is independent
  /// of pointer width; `Isize`/`Usize` are sized by the caller against
  /// [`crate::target::TargetSpec::pointer_size`].
  #[must_use] pub fn fixed_size(self) -> Option<u64> {
    use Primitive::*;
    Some(match self {
      Bool | I8 | U8 => 1,
      I16 | U16 => 2,
      Char | I32 | U32 | F32 => 4,
      I64 | U64 | F64 => 8,
      I128 | U128 => 16,
      Isize | Usize => return None,
    })
  }

  /// `true` for the signed integer primitives.
  #[must_use] pub fn is_signed_int(self) -> bool {
    matches!(self, Primitive::I8 | Primitive::I16 | Primitive::I32
      | Primitive::I64 | Primitive::I128 | Primitive::Isize)
  }
}

/// Whether a borrow or pointer is read-only or read-write, plus the
/// additional owning-borrow case used for `Box`-like owned references.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RefKind {
  /// A shared, non-owning reference.
  Shared,
  /// A unique, non-owning reference.
  Mut,
  /// An owning reference (the source language's `Box`): the referent's
  /// drop glue must run when this is dropped.
  Owned,
}

/// Mutability of a raw pointer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PtrKind {
  /// `*const T`.
  Const,
  /// `*mut T`.
  Mut,
}

/// The set of auto (marker) traits attached to a trait-object type, encoded
/// as a bitflag set so that e.g. `dyn Tr + Send + Sync` and `dyn Tr + Sync +
/// Send` compare equal and hash identically.
bitflags::bitflags! {
  #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
  pub struct AutoTraits: u8 {
    /// `Send`.
    const SEND = 1 << 0;
    /// `Sync`.
    const SYNC = 1 << 1;
    /// `Unpin`.
    const UNPIN = 1 << 2;
  }
}

/// The tagged-union type representation.
///
/// Invariant (checked at the enumeration/monomorphisation boundary, §3):
/// no `TypeRef` reachable for emission contains [`TypeRef::Infer`] or an
/// unresolved generic parameter; [`TypeRef::Diverge`] only appears in
/// function return position.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeRef {
  /// A scalar primitive.
  Primitive(Primitive),
  /// A struct, union, or enum, with its type parameters.
  Path(Path),
  /// A fixed-arity product type.
  Tuple(Rc<[TypeRef]>),
  /// `[T; N]` with a statically known element count.
  Array(Rc<TypeRef>, u64),
  /// `[T]`, an unsized slice; only appears behind a borrow or pointer.
  Slice(Rc<TypeRef>),
  /// A borrowed, possibly-owning reference.
  Borrow(RefKind, Rc<TypeRef>),
  /// A raw pointer.
  Pointer(PtrKind, Rc<TypeRef>),
  /// A function pointer type, `fn(Args...) -> Ret`.
  FnPtr(Rc<[TypeRef]>, Rc<TypeRef>),
  /// The zero-sized type naming one specific function item (as opposed to
  /// a [`TypeRef::FnPtr`], which only fixes the signature).
  NamedFunction(Path),
  /// `dyn Trait + AutoTraits...`, an unsized trait object.
  TraitObject(Path, AutoTraits),
  /// An opaque type from an external crate we only have an index for
  /// (layout/identity known to the oracle, structure otherwise unavailable).
  Erased(u32),
  /// The never type `!`; only valid in return position and certain
  /// uninhabited-match arms.
  Diverge,
  /// A generic parameter or inference variable. Must not survive past
  /// monomorphisation; present only in template (un-monomorphised) bodies.
  /// Indices `0..impl_params.len()` name impl-level parameters, and
  /// `impl_params.len()..` name method-level ones — see
  /// [`crate::trans_list::Params::monomorphize_ty`].
  Infer(u32),
  /// `Self`, as it appears in a trait default method body before the
  /// impl's concrete self type is substituted in.
  SelfPlaceholder,
}

impl TypeRef {
  /// Shorthand for the common `()` unit type, represented as a 0-tuple.
  #[must_use] pub fn unit() -> Self { TypeRef::Tuple(Rc::from([])) }

  /// `true` for [`TypeRef::Infer`]; used by the enumerator's "generic after
  /// monomorphisation" assertion (§4.1).
  #[must_use] pub fn is_generic(&self) -> bool {
    match self {
      TypeRef::Infer(_) | TypeRef::SelfPlaceholder => true,
      TypeRef::Tuple(tys) => tys.iter().any(Self::is_generic),
      TypeRef::Array(t, _) | TypeRef::Slice(t) | TypeRef::Borrow(_, t) | TypeRef::Pointer(_, t) =>
        t.is_generic(),
      TypeRef::FnPtr(args, ret) => args.iter().any(Self::is_generic) || ret.is_generic(),
      TypeRef::Path(p) => p.params().types.iter().any(Self::is_generic),
      TypeRef::NamedFunction(p) | TypeRef::TraitObject(p, _) => p.params().types.iter().any(Self::is_generic),
      TypeRef::Primitive(_) | TypeRef::Erased(_) | TypeRef::Diverge => false,
    }
  }

  /// `true` if this type owns heap data reachable through it (i.e. dropping
  /// a value of this type can run user code), used to decide shallow vs.
  /// deep type enumeration (§4.4) and to decide whether drop glue is
  /// nontrivial (§4.3).
  #[must_use] pub fn is_owned_data(&self) -> bool {
    match self {
      TypeRef::Borrow(RefKind::Owned, _) => true,
      TypeRef::Path(_) | TypeRef::Tuple(_) | TypeRef::Array(..) => true,
      TypeRef::Borrow(_, _) | TypeRef::Pointer(..) | TypeRef::FnPtr(..) |
      TypeRef::NamedFunction(_) | TypeRef::Primitive(_) | TypeRef::Erased(_) |
      TypeRef::Diverge | TypeRef::Infer(_) | TypeRef::SelfPlaceholder => false,
      TypeRef::Slice(_) | TypeRef::TraitObject(..) => true,
    }
  }

  /// `true` for types that only ever appear behind a pointer indirection at
  /// this occurrence and so only need a shallow (forward-declared) entry;
  /// callers still upgrade to deep if the same type is reached by an owning
  /// path elsewhere (§4.4).
  #[must_use] pub fn pulls_in_referent_shallowly(&self) -> bool {
    matches!(self, TypeRef::Borrow(RefKind::Shared | RefKind::Mut, _) | TypeRef::Pointer(..) | TypeRef::FnPtr(..))
  }
}

impl std::fmt::Display for TypeRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TypeRef::Primitive(p) => write!(f, "{p:?}"),
      TypeRef::Path(p) => write!(f, "{p}"),
      TypeRef::Tuple(tys) => {
        write!(f, "(")?;
        for (i, t) in tys.iter().enumerate() { if i > 0 { write!(f, ", ")?; } write!(f, "{t}")?; }
        write!(f, ")")
      }
      TypeRef::Array(t, n) => write!(f, "[{t}; {n}]"),
      TypeRef::Slice(t) => write!(f, "[{t}]"),
      TypeRef::Borrow(RefKind::Shared, t) => write!(f, "&{t}"),
      TypeRef::Borrow(RefKind::Mut, t) => write!(f, "&mut {t}"),
      TypeRef::Borrow(RefKind::Owned, t) => write!(f, "Box<{t}>"),
      TypeRef::Pointer(PtrKind::Const, t) => write!(f, "*const {t}"),
      TypeRef::Pointer(PtrKind::Mut, t) => write!(f, "*mut {t}"),
      TypeRef::FnPtr(args, ret) => {
        write!(f, "fn(")?;
        for (i, t) in args.iter().enumerate() { if i > 0 { write!(f, ", ")?; } write!(f, "{t}")?; }
        write!(f, ") -> {ret}")
      }
      TypeRef::NamedFunction(p) => write!(f, "{{fn item {p}}}"),
      TypeRef::TraitObject(p, auto) => write!(f, "dyn {p} (+{auto:?})"),
      TypeRef::Erased(idx) => write!(f, "{{erased #{idx}}}"),
      TypeRef::Diverge => write!(f, "!"),
      TypeRef::Infer(idx) => write!(f, "?{idx}"),
      TypeRef::SelfPlaceholder => write!(f, "Self"),
    }
  }
}

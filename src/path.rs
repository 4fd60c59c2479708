//! [`Path`]: the fully-qualified identity of every function, static,
//! const, and vtable the core handles.
//!
//! §3 requires three shapes to coexist and round-trip:
//!
//! 1. *generic* — a dotted name plus a parameter list (`crate::module::item::<T>`),
//! 2. *inherent UFCS* — `<SelfTy>::item::<method params>` where the impl
//!    itself may carry its own parameters (`<Vec<T>>::push`),
//! 3. *known UFCS* — `<SelfTy as Trait>::item` (`<S as Clone>::clone`).
//!
//! Lifetime parameters are preserved for debuggability but are semantically
//! inert: two paths that differ only in their lifetime arguments name the
//! same monomorphised item. We resolve the open question in the design
//! notes explicitly by splitting comparison into two operations: the
//! `Hash`/`Eq` impls below are *full* structural equality (lifetimes
//! included, used for exact round-trip tests), while [`Path::mono_key`]
//! produces the lifetime-erased key that [`crate::trans_list::TransList`]
//! actually deduplicates on.

use std::fmt;
use std::rc::Rc;
use crate::symbol::Symbol;
use crate::ty::TypeRef;

/// A named lifetime parameter or argument. Purely cosmetic: never consulted
/// by any comparison that matters for codegen.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Lifetime(pub Symbol);

/// An ordered tuple of type arguments plus an ordered tuple of lifetime
/// arguments.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct PathParams {
  /// Type arguments, in declaration order.
  pub types: Rc<[TypeRef]>,
  /// Lifetime arguments, in declaration order. Never affects identity.
  pub lifetimes: Rc<[Lifetime]>,
}

impl PathParams {
  /// No arguments at all (a non-generic item).
  #[must_use] pub fn empty() -> Self { Self { types: Rc::from([]), lifetimes: Rc::from([]) } }

  /// Just type arguments, no lifetimes.
  #[must_use] pub fn from_types(types: impl Into<Rc<[TypeRef]>>) -> Self {
    Self { types: types.into(), lifetimes: Rc::from([]) }
  }
}

/// A dotted name (`crate_name::a::b::c`) plus its parameter list. Used both
/// as the top-level "generic" path shape and to name the trait in a
/// *known UFCS* path.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GenericPath {
  /// The defining crate.
  pub crate_name: Symbol,
  /// Path components after the crate name.
  pub components: Rc<[Symbol]>,
  /// Type/lifetime arguments applied to the named item.
  pub params: PathParams,
}

impl fmt::Display for GenericPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.crate_name)?;
    for c in self.components.iter() { write!(f, "::{c}")?; }
    if !self.params.types.is_empty() {
      write!(f, "::<")?;
      for (i, t) in self.params.types.iter().enumerate() { if i > 0 { write!(f, ", ")?; } write!(f, "{t}")?; }
      write!(f, ">")?;
    }
    Ok(())
  }
}

/// The three interchangeable shapes a [`Path`] may take.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum PathData {
  /// `crate::a::b::c::<T, U>`.
  Generic(GenericPath),
  /// `<SelfTy>::item::<method params>`, where the impl block itself may be
  /// generic (`impl_params`) independently of the method (`method_params`).
  InherentUfcs {
    /// The `Self` type of the inherent impl.
    self_ty: Rc<TypeRef>,
    /// The item name (method, associated const, ...).
    item: Symbol,
    /// Type parameters supplied to the method itself.
    method_params: PathParams,
    /// Type parameters supplied to the impl block.
    impl_params: PathParams,
  },
  /// `<SelfTy as Trait>::item`.
  KnownUfcs {
    /// The concrete (or, pre-monomorphisation, still-generic) `Self` type.
    self_ty: Rc<TypeRef>,
    /// The trait being implemented, with its own parameters.
    trait_: GenericPath,
    /// The item name within the trait.
    item: Symbol,
  },
}

/// A fully qualified name: the identity of a function, static, const, or
/// vtable. Cheap to clone (`Rc`-backed).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Path(pub Rc<PathData>);

impl Path {
  /// Build a *generic*-shaped path.
  #[must_use] pub fn generic(crate_name: Symbol, components: impl Into<Rc<[Symbol]>>, params: PathParams) -> Self {
    Path(Rc::new(PathData::Generic(GenericPath { crate_name, components: components.into(), params })))
  }

  /// Build an *inherent UFCS*-shaped path.
  #[must_use] pub fn inherent_ufcs(self_ty: TypeRef, item: Symbol, method_params: PathParams, impl_params: PathParams) -> Self {
    Path(Rc::new(PathData::InherentUfcs { self_ty: Rc::new(self_ty), item, method_params, impl_params }))
  }

  /// Build a *known UFCS*-shaped path.
  #[must_use] pub fn known_ufcs(self_ty: TypeRef, trait_: GenericPath, item: Symbol) -> Self {
    Path(Rc::new(PathData::KnownUfcs { self_ty: Rc::new(self_ty), trait_, item }))
  }

  /// Synthesise the drop-glue path for a type: `<T>::#drop_glue`.
  #[must_use] pub fn drop_glue(ty: TypeRef) -> Self {
    Path::inherent_ufcs(ty, crate::symbol::intern("#drop_glue"), PathParams::empty(), PathParams::empty())
  }

  /// Synthesise the vtable path for a `(Self, Trait)` pair: `<Self as Trait>::#vtable`.
  #[must_use] pub fn vtable(self_ty: TypeRef, trait_: GenericPath) -> Self {
    Path::known_ufcs(self_ty, trait_, crate::symbol::intern("#vtable"))
  }

  /// Synthesise the trait-object method thunk path: `<dyn Trait>::method`.
  #[must_use] pub fn trait_object_thunk(trait_obj: TypeRef, trait_: GenericPath, method: Symbol) -> Self {
    Path::known_ufcs(trait_obj, trait_, method)
  }

  /// Synthesise the by-value-receiver vtable shim path for a method whose
  /// first argument is `Self` rather than a borrow of it: the vtable can
  /// only ever store a `fn(&mut data, ...)`-shaped pointer, so such a method
  /// is never installed in the vtable directly (§4.3 "VTable materialisation").
  #[must_use] pub fn by_value_shim(self_ty: TypeRef, trait_: GenericPath, method: Symbol) -> Self {
    Path::known_ufcs(self_ty, trait_, crate::symbol::intern(&format!("#by_value_shim${method}")))
  }

  /// The effective parameter list of this path (empty for inherent UFCS
  /// method parameters combined with impl parameters is handled by callers
  /// that need both separately; this returns the single list relevant to
  /// the *generic* and *known UFCS* shapes, and the method params for
  /// inherent UFCS).
  #[must_use] pub fn params(&self) -> &PathParams {
    match &*self.0 {
      PathData::Generic(g) => &g.params,
      PathData::InherentUfcs { method_params, .. } => method_params,
      PathData::KnownUfcs { trait_, .. } => &trait_.params,
    }
  }

  /// A lifetime-erased copy of this path, suitable as a `HashMap` key for
  /// instance deduplication (§4.1: "insertion is idempotent" keyed on the
  /// monomorphised path with lifetimes stripped).
  #[must_use] pub fn mono_key(&self) -> PathKey { PathKey(strip_lifetimes(self)) }

  /// Append a suffix to this path's final item name, used to derive a
  /// related synthetic path (e.g. a panic-message static keyed off the
  /// function it belongs to) without constructing a whole new `PathData`
  /// shape by hand.
  #[must_use] pub fn with_item_suffix(&self, suffix: &str) -> Path {
    match &*self.0 {
      PathData::Generic(g) => {
        let mut components = g.components.to_vec();
        if let Some(last) = components.last_mut() { *last = crate::symbol::intern(&format!("{last}{suffix}")); }
        Path::generic(g.crate_name, components, g.params.clone())
      }
      PathData::InherentUfcs { self_ty, item, method_params, impl_params } =>
        Path::inherent_ufcs((**self_ty).clone(), crate::symbol::intern(&format!("{item}{suffix}")), method_params.clone(), impl_params.clone()),
      PathData::KnownUfcs { self_ty, trait_, item } =>
        Path::known_ufcs((**self_ty).clone(), trait_.clone(), crate::symbol::intern(&format!("{item}{suffix}"))),
    }
  }
}

impl fmt::Display for Path {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &*self.0 {
      PathData::Generic(g) => write!(f, "{g}"),
      PathData::InherentUfcs { self_ty, item, method_params, .. } => {
        write!(f, "<{self_ty}>::{item}")?;
        if !method_params.types.is_empty() {
          write!(f, "::<")?;
          for (i, t) in method_params.types.iter().enumerate() { if i > 0 { write!(f, ", ")?; } write!(f, "{t}")?; }
          write!(f, ">")?;
        }
        Ok(())
      }
      PathData::KnownUfcs { self_ty, trait_, item } => write!(f, "<{self_ty} as {trait_}>::{item}"),
    }
  }
}

fn strip_lifetimes(p: &Path) -> Rc<PathData> {
  fn strip_params(pp: &PathParams) -> PathParams {
    PathParams { types: pp.types.clone(), lifetimes: Rc::from([]) }
  }
  Rc::new(match &*p.0 {
    PathData::Generic(g) => PathData::Generic(GenericPath {
      crate_name: g.crate_name, components: g.components.clone(), params: strip_params(&g.params),
    }),
    PathData::InherentUfcs { self_ty, item, method_params, impl_params } => PathData::InherentUfcs {
      self_ty: self_ty.clone(), item: *item,
      method_params: strip_params(method_params), impl_params: strip_params(impl_params),
    },
    PathData::KnownUfcs { self_ty, trait_, item } => PathData::KnownUfcs {
      self_ty: self_ty.clone(),
      trait_: GenericPath { crate_name: trait_.crate_name, components: trait_.components.clone(), params: strip_params(&trait_.params) },
      item: *item,
    },
  })
}

/// A lifetime-erased [`Path`], used as the deduplication key in
/// [`crate::trans_list::TransList`]. Two [`Path`]s with the same
/// [`PathKey`] name the same monomorphised item.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PathKey(Rc<PathData>);

impl fmt::Display for PathKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(&Path(self.0.clone()), f) }
}

impl PathKey {
  /// Recover a lifetime-erased [`Path`] from this key. Since [`Path::mono_key`]
  /// only strips lifetime arguments, this is a legitimate (if degenerate)
  /// `Path` in its own right — codegen uses it directly for mangling and
  /// signature lookup, since by the time the backend runs every path in
  /// scope is already fully concrete.
  #[must_use] pub fn as_path(&self) -> Path { Path(self.0.clone()) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ty::{Primitive, TypeRef};

  fn sym(s: &str) -> Symbol { crate::symbol::intern(s) }

  #[test]
  fn mono_key_ignores_lifetimes() {
    let a = Path::generic(sym("krate"), [sym("f")], PathParams {
      types: Rc::from([TypeRef::Primitive(Primitive::I32)]),
      lifetimes: Rc::from([Lifetime(sym("'a"))]),
    });
    let b = Path::generic(sym("krate"), [sym("f")], PathParams {
      types: Rc::from([TypeRef::Primitive(Primitive::I32)]),
      lifetimes: Rc::from([Lifetime(sym("'b"))]),
    });
    assert_ne!(a, b, "full equality distinguishes lifetime arguments");
    assert_eq!(a.mono_key(), b.mono_key(), "mono_key erases them");
  }

  #[test]
  fn display_round_trips_shape() {
    let p = Path::inherent_ufcs(TypeRef::Primitive(Primitive::I32), sym("wrapping_add"),
      PathParams::empty(), PathParams::empty());
    assert_eq!(p.to_string(), "<I32>::wrapping_add");
  }
}

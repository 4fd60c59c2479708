//! The layout oracle contract (`Target_GetTypeRepr` in §1/§6).
//!
//! Layout computation — choosing field order, padding, and discriminant
//! encoding — is explicitly out of scope for this crate. We consume it as
//! a pure, memoised function from [`TypeRef`] to [`TypeRepr`]; every size,
//! alignment, and field offset used by the enumerator, the auto-impl
//! synthesiser and the codegen backend is read from here, never recomputed.

use std::rc::Rc;
use crate::ty::TypeRef;
use crate::error::Result;

/// One field of a struct/union/enum-variant layout, as placed by the oracle.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRepr {
  /// Byte offset from the start of the containing type.
  pub offset: u64,
  /// The field's type.
  pub ty: TypeRef,
}

/// How an enum's active variant is determined at runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum VariantsRepr {
  /// A single-variant enum (or a struct/union): no discriminant exists.
  None,
  /// An explicit tag field holding one of a fixed set of values, read at
  /// `field_path` (a chain of field indices from the type root to the tag).
  Values {
    /// Path to the tag field.
    field_path: Vec<u32>,
    /// The tag value for each variant, in declaration order.
    values: Vec<i128>,
  },
  /// A niche optimisation: the discriminant is encoded by whether a
  /// particular field (typically inside the payload of the non-niche
  /// variant) is zero.
  NonZero {
    /// Path to the niche-bearing field.
    field_path: Vec<u32>,
    /// Which variant index corresponds to the all-zero encoding.
    zero_variant_index: u32,
  },
  /// A contiguous range of tag values starting at `offset`, stored at
  /// `field_path`, optionally itself superimposed on a niche.
  Linear {
    /// Path to the tag field.
    field_path: Vec<u32>,
    /// The tag value of variant 0; variant `i` has tag `offset + i`.
    offset: i128,
    /// If this tag is itself encoded via a niche in a smaller range.
    niche: Option<(u64, u64)>,
  },
}

/// The frozen layout of one concrete type, as produced by the external
/// layout oracle.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeRepr {
  /// Total size in bytes.
  pub size: u64,
  /// Required alignment in bytes.
  pub align: u64,
  /// Ordered fields with their offsets. For enums this is the set of
  /// fields common to every variant (just the tag, for a `Values`/`Linear`
  /// discriminant); per-variant payload fields are in
  /// [`TypeRepr::variant_fields`].
  pub fields: Vec<FieldRepr>,
  /// How to determine (and switch on) the active variant, if this is an
  /// enum with more than one variant.
  pub variants: VariantsRepr,
  /// Payload fields of each variant, in declaration order, parallel to
  /// [`VariantsRepr`]'s per-variant entries. Empty for structs/unions,
  /// which put everything in [`TypeRepr::fields`] instead.
  pub variant_fields: Vec<Vec<FieldRepr>>,
}

impl TypeRepr {
  /// `true` if this type has no discriminant at all (a plain struct/union,
  /// or a one-variant enum) — §8's "enum with one variant and no data"
  /// boundary case falls out of this naturally.
  #[must_use] pub fn is_untagged(&self) -> bool { matches!(self.variants, VariantsRepr::None) }
}

/// A pure, memoised function from type to layout. Implementations are
/// expected to cache internally; callers never need to cache the result
/// themselves ("memoisation is opaque to callers", §5).
pub trait LayoutOracle {
  /// Compute (or fetch from cache) the layout of `ty`. Fails only if `ty`
  /// is unsized or otherwise has no fixed layout (slices, trait objects,
  /// and `str` are queried through [`LayoutOracle::unsized_tail`] instead).
  fn type_repr(&self, ty: &TypeRef) -> Result<Rc<TypeRepr>>;

  /// For an unsized type (slice, `str`, trait object), the fixed-size
  /// prefix layout plus how to interpret the metadata half of a fat
  /// pointer to it. Returns `None` for sized types.
  fn unsized_tail(&self, ty: &TypeRef) -> Option<UnsizedTail>;
}

/// Describes what the metadata word of a fat pointer means for a
/// particular unsized tail type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnsizedTail {
  /// Metadata is an element count; total size is `count * elem_size`.
  Slice {
    /// Size in bytes of one slice element.
    elem_size: u64,
  },
  /// Metadata is a vtable pointer.
  TraitObject,
}

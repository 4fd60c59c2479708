//! Encoded constant data: the byte-level representation of statics and
//! constants, produced by the frontend's constant evaluator and consumed
//! verbatim by codegen.

use crate::path::Path;

/// What a relocation's target byte range points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RelocTarget {
  /// A pointer to another global (function, static, const, vtable).
  Path(Path),
  /// A pointer to an interned byte-string literal (e.g. a `&str` or `&[u8]`
  /// literal embedded in the surrounding constant).
  Bytes(std::rc::Rc<[u8]>),
}

/// A pointer-sized slot within an [`EncodedLiteral`] that must be patched
/// (by codegen, textually) to hold the address of some other item rather
/// than the raw bytes the frontend's evaluator produced.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Relocation {
  /// Byte offset of the slot within [`EncodedLiteral::bytes`].
  pub offset: u32,
  /// Byte width of the slot (equal to the pointer width, or double that
  /// for a fat pointer's `{ptr, meta}` pair when `meta` is itself a
  /// relocation — represented as two adjacent [`Relocation`]s in practice).
  pub length: u32,
  /// What the slot should point to.
  pub target: RelocTarget,
}

/// A flattened constant value: a byte buffer plus the relocations needed
/// to turn pointer-shaped byte ranges into real addresses once the target
/// layout of every referenced item is known.
#[derive(Clone, Debug, Default)]
pub struct EncodedLiteral {
  /// The raw bytes, target-endian, as the layout oracle pre-encoded them.
  pub bytes: Vec<u8>,
  /// Relocations into `bytes`, in ascending offset order.
  pub relocations: Vec<Relocation>,
}

impl EncodedLiteral {
  /// An all-zero buffer of the given size with no relocations (used for
  /// `uninit`/padding constants and as a starting point when building one
  /// up field by field).
  #[must_use] pub fn zeroed(size: usize) -> Self { Self { bytes: vec![0; size], relocations: Vec::new() } }

  /// The paths referenced by this literal's relocations, in order — the
  /// set the enumerator must additionally enqueue (§4.1 step 5).
  pub fn referenced_paths(&self) -> impl Iterator<Item = &Path> {
    self.relocations.iter().filter_map(|r| match &r.target {
      RelocTarget::Path(p) => Some(p),
      RelocTarget::Bytes(_) => None,
    })
  }
}

//! The input contract this crate expects from the frontend (§6).
//!
//! Everything in this module is a trait or a plain data record describing
//! what the lexer/parser/macro-expander/resolver/typechecker hands us —
//! none of it is implemented here. A real driver wires up a `TypedCrate`
//! backed by its own HIR; the test suite in this crate uses the small
//! in-memory [`TestCrate`] implementation at the bottom of the file.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::literal::EncodedLiteral;
use crate::mir::Function as MirFunction;
use crate::path::{GenericPath, Path, PathKey};
use crate::symbol::Symbol;
use crate::ty::TypeRef;

/// Visibility of an item, coarse enough for root selection in library mode
/// (§4.1): "every globally visible value item".
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Visibility {
  /// Visible only within its defining module.
  Private,
  /// Visible within the defining crate only.
  PubCrate,
  /// Visible to downstream crates.
  Public,
}

/// A well-known item the compiler must be able to find by name, independent
/// of where the user's source happens to define it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LangItem {
  /// The language's runtime entry point, wrapping the user's `main`.
  Start,
  /// `Drop::drop`.
  Drop,
  /// The owned-box deallocation function.
  BoxFree,
  /// `Clone::clone`.
  Clone,
  /// The panic handler invoked on an unrecoverable assertion failure.
  PanicHandler,
  /// An alternate C-ABI entry point usable instead of [`LangItem::Start`]
  /// when the target wants a bare `main(argc, argv)` with no language
  /// runtime adapter (§4.6 Finalisation).
  CStyleStart,
}

/// A function or method signature as the typechecker produced it.
#[derive(Clone, Debug)]
pub struct FnSig {
  /// Argument types, in declaration order.
  pub args: Vec<TypeRef>,
  /// Return type.
  pub ret: TypeRef,
}

/// One function (free function, method, or trait default) as known to the
/// frontend.
#[derive(Debug)]
pub struct FunctionDef {
  /// The signature, pre-substitution.
  pub sig: FnSig,
  /// Number of leading generic type parameters this function takes
  /// (impl-level parameters are tracked by the caller's `impl_params`).
  pub generic_count: u32,
  /// The MIR body, if one exists (`None` for `extern` declarations with no
  /// local definition).
  pub body: Option<Rc<MirFunction>>,
  /// Visibility, used for root selection in library mode.
  pub visibility: Visibility,
  /// `true` if this is an `extern` function that must be resolved against
  /// a `link_name` rather than compiled from a body (§4.1 "External
  /// linkage resolution").
  pub is_extern: bool,
  /// The `#[link_name = "..."]` value, if any.
  pub link_name: Option<Rc<str>>,
  /// Whether this function is tagged as a specific lang item.
  pub lang_item: Option<LangItem>,
  /// Set by the enumerator once it determines this generic function is
  /// visible from downstream crates and must keep its MIR across the
  /// crate boundary (§4.1 "Visibility and 'save code' flag").
  pub save_code: Cell<bool>,
}

/// A `static` item.
#[derive(Debug)]
pub struct StaticDef {
  /// The static's type.
  pub ty: TypeRef,
  /// Its encoded initial value, if this crate defines it (vs. an `extern`
  /// static with no local value).
  pub value: Option<EncodedLiteral>,
  /// Visibility.
  pub visibility: Visibility,
}

/// A `const` item. Frontend constant evaluation has already run, so unlike
/// [`FunctionDef`] there is no "body" — just the evaluated value.
#[derive(Debug)]
pub struct ConstDef {
  /// The const's type.
  pub ty: TypeRef,
  /// Its evaluated value.
  pub value: EncodedLiteral,
  /// Visibility.
  pub visibility: Visibility,
}

/// One non-generic impl item with concrete impl parameters, as enumerated
/// as a library-mode root (§4.1): "every applicable item of every
/// non-generic trait impl and inherent impl whose impl parameters are
/// concrete".
#[derive(Clone, Debug)]
pub struct ConcreteImplItem {
  /// The path naming this item (inherent- or known-UFCS shaped).
  pub path: Path,
}

/// Metadata about one externally loaded crate: where its pre-built object
/// code lives and what system libraries it needs linked in (§6).
#[derive(Clone, Debug)]
pub struct ExternCrate {
  /// The crate's name as it appears in path components.
  pub name: Symbol,
  /// Path to its compiled object/archive, to be passed to the host linker.
  pub object_path: PathBuf,
  /// Names of system libraries this crate's `#[link]` attributes require.
  pub link_libraries: Vec<String>,
}

/// The read-only typed program this crate compiles. Owned and produced by
/// the frontend; the core only ever reads from it, except for flipping
/// [`FunctionDef::save_code`] during enumeration (§5).
pub trait TypedCrate {
  /// Look up a function/method definition by its fully qualified path.
  /// `path` may still carry generic parameters; the definition returned is
  /// the *template*, to be monomorphised by the caller.
  fn lookup_function(&self, path: &Path) -> Option<&FunctionDef>;
  /// Look up a `static` by path.
  fn lookup_static(&self, path: &Path) -> Option<&StaticDef>;
  /// Look up a `const` by path.
  fn lookup_const(&self, path: &Path) -> Option<&ConstDef>;

  /// `main` plus the language start item, for binary-mode root selection.
  fn binary_roots(&self) -> Option<(Path, Path)>;
  /// Every globally visible value item plus every concrete impl item, for
  /// library-mode root selection.
  fn library_roots(&self) -> Vec<ConcreteImplItem>;

  /// Resolve a well-known lang item to its defining path.
  fn lang_item(&self, item: LangItem) -> Option<Path>;

  /// The ordered list of trait method names used to assign vtable slot
  /// indices (§4.3 "the index N in the vtable is 3 + N").
  fn value_indexes(&self, trait_: &GenericPath) -> &[Symbol];
  /// The parent traits of `trait_`, for filling inherited vtable fields by
  /// name lookup (§4.3 "Parent-trait vtable fields are filled by name
  /// lookup against the current type").
  fn parent_traits(&self, trait_: &GenericPath) -> &[GenericPath];

  /// Resolve an `extern` function with the given `link_name` against every
  /// loaded crate's definitions (§4.1 "External linkage resolution").
  fn resolve_link_name(&self, link_name: &str) -> Option<Path>;

  /// Externally loaded crates, for the final link command (§6).
  fn extern_crates(&self) -> &[ExternCrate];
}

/// A minimal in-memory [`TypedCrate`], used by this crate's own test suite
/// and as a template for a real driver's implementation.
#[derive(Default)]
pub struct TestCrate {
  /// Functions, keyed by lifetime-erased path.
  pub functions: HashMap<PathKey, FunctionDef>,
  /// Statics, keyed by lifetime-erased path.
  pub statics: HashMap<PathKey, StaticDef>,
  /// Consts, keyed by lifetime-erased path.
  pub consts: HashMap<PathKey, ConstDef>,
  /// Binary-mode roots, if this is a `main`-having crate.
  pub binary_roots: Option<(Path, Path)>,
  /// Library-mode roots.
  pub library_roots: Vec<ConcreteImplItem>,
  /// Lang item table.
  pub lang_items: HashMap<LangItem, Path>,
  /// Vtable method orderings, keyed by the trait's lifetime-erased path.
  pub value_indexes: HashMap<PathKey, Vec<Symbol>>,
  /// Parent-trait tables, keyed the same way.
  pub parent_traits: HashMap<PathKey, Vec<GenericPath>>,
  /// `link_name -> Path` table simulating cross-crate `extern` resolution.
  pub link_names: HashMap<String, Path>,
  /// Loaded external crates.
  pub externs: Vec<ExternCrate>,
}

impl TypedCrate for TestCrate {
  fn lookup_function(&self, path: &Path) -> Option<&FunctionDef> { self.functions.get(&path.mono_key()) }
  fn lookup_static(&self, path: &Path) -> Option<&StaticDef> { self.statics.get(&path.mono_key()) }
  fn lookup_const(&self, path: &Path) -> Option<&ConstDef> { self.consts.get(&path.mono_key()) }
  fn binary_roots(&self) -> Option<(Path, Path)> { self.binary_roots.clone() }
  fn library_roots(&self) -> Vec<ConcreteImplItem> { self.library_roots.clone() }
  fn lang_item(&self, item: LangItem) -> Option<Path> { self.lang_items.get(&item).cloned() }
  fn value_indexes(&self, trait_: &GenericPath) -> &[Symbol] {
    self.value_indexes.get(&generic_path_key(trait_)).map_or(&[], Vec::as_slice)
  }
  fn parent_traits(&self, trait_: &GenericPath) -> &[GenericPath] {
    self.parent_traits.get(&generic_path_key(trait_)).map_or(&[], Vec::as_slice)
  }
  fn resolve_link_name(&self, link_name: &str) -> Option<Path> { self.link_names.get(link_name).cloned() }
  fn extern_crates(&self) -> &[ExternCrate] { &self.externs }
}

pub(crate) fn generic_path_key(g: &GenericPath) -> PathKey {
  Path::generic(g.crate_name, g.components.clone(), crate::path::PathParams::empty()).mono_key()
}

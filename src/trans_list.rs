//! [`TransList`]: the enumeration output (§3).
//!
//! A `TransList` is an append-only (during enumeration) / erase-only
//! (during cleanup, §4.1) map from concrete [`Path`] to the monomorphised
//! instance that must be emitted, plus the auxiliary sets codegen needs:
//! vtables, type references (by enumeration depth), `type_id` types, the
//! auto-Clone and auto-FnPtr sets, drop-glue types, and constructor paths.

use std::collections::HashMap;
use std::rc::Rc;

use crate::mir::Function as MirBody;
use crate::path::{GenericPath, Path, PathKey, PathParams};
use crate::ty::TypeRef;

/// `Trans_Params`: the substitution in effect for one concrete instance —
/// the impl block's type arguments, the method's own type arguments, and
/// (for a trait default method) the concrete `Self` type.
#[derive(Clone, Debug, Default)]
pub struct Params {
  /// Type arguments supplied to the enclosing impl block.
  pub impl_params: PathParams,
  /// Type arguments supplied to the method/function itself.
  pub method_params: PathParams,
  /// The concrete `Self` type, for trait default methods and
  /// [`TypeRef::SelfPlaceholder`] occurrences.
  pub self_type: Option<TypeRef>,
}

impl Params {
  /// The substitution for a fully concrete, non-generic, non-method item:
  /// every `TypeRef::Infer`/`SelfPlaceholder` in such a body would be a bug.
  #[must_use] pub fn identity() -> Self { Self::default() }

  /// Extract the substitution implied by a path's own shape: a *generic*
  /// path's arguments become `method_params`, an *inherent UFCS* path
  /// splits its two parameter lists, and a *known UFCS* path's impl
  /// arguments (the trait's own arguments) become `impl_params` with
  /// `self_type` set from the path's `Self` type. Used when a freshly
  /// discovered path is enqueued as a work item: the path itself carries
  /// everything needed to monomorphise the body it names.
  #[must_use] pub fn from_path(path: &Path) -> Self {
    use crate::path::PathData;
    match &*path.0 {
      PathData::Generic(g) => Params { impl_params: PathParams::empty(), method_params: g.params.clone(), self_type: None },
      PathData::InherentUfcs { self_ty, method_params, impl_params, .. } =>
        Params { impl_params: impl_params.clone(), method_params: method_params.clone(), self_type: Some((**self_ty).clone()) },
      PathData::KnownUfcs { self_ty, trait_, .. } =>
        Params { impl_params: trait_.params.clone(), method_params: PathParams::empty(), self_type: Some((**self_ty).clone()) },
    }
  }

  /// Substitute every [`TypeRef::Infer`]/[`TypeRef::SelfPlaceholder`]
  /// occurrence in `ty` according to this substitution. This is the raw
  /// substitution step; [`crate::monomorphise`] additionally expands
  /// associated-type projections through the oracle around calls to this.
  #[must_use] pub fn monomorphize_ty(&self, ty: &TypeRef) -> TypeRef {
    match ty {
      TypeRef::Infer(idx) => {
        let i = *idx as usize;
        if i < self.impl_params.types.len() { self.impl_params.types[i].clone() }
        else { self.method_params.types[i - self.impl_params.types.len()].clone() }
      }
      TypeRef::SelfPlaceholder => self.self_type.clone().expect("Self substituted with no self_type"),
      TypeRef::Tuple(tys) => TypeRef::Tuple(tys.iter().map(|t| self.monomorphize_ty(t)).collect()),
      TypeRef::Array(t, n) => TypeRef::Array(Rc::new(self.monomorphize_ty(t)), *n),
      TypeRef::Slice(t) => TypeRef::Slice(Rc::new(self.monomorphize_ty(t))),
      TypeRef::Borrow(k, t) => TypeRef::Borrow(*k, Rc::new(self.monomorphize_ty(t))),
      TypeRef::Pointer(k, t) => TypeRef::Pointer(*k, Rc::new(self.monomorphize_ty(t))),
      TypeRef::FnPtr(args, ret) => TypeRef::FnPtr(
        args.iter().map(|t| self.monomorphize_ty(t)).collect(),
        Rc::new(self.monomorphize_ty(ret)),
      ),
      TypeRef::Path(p) => TypeRef::Path(self.monomorphize_path(p)),
      TypeRef::NamedFunction(p) => TypeRef::NamedFunction(self.monomorphize_path(p)),
      TypeRef::TraitObject(p, auto) => TypeRef::TraitObject(self.monomorphize_path(p), *auto),
      TypeRef::Primitive(_) | TypeRef::Erased(_) | TypeRef::Diverge => ty.clone(),
    }
  }

  /// Substitute a whole [`PathParams`] list.
  #[must_use] pub fn monomorphize_params(&self, pp: &PathParams) -> PathParams {
    PathParams { types: pp.types.iter().map(|t| self.monomorphize_ty(t)).collect(), lifetimes: pp.lifetimes.clone() }
  }

  /// Substitute a [`Path`]. The `Path`'s own shape is preserved; only the
  /// type arguments and any embedded `self_ty` are substituted.
  #[must_use] pub fn monomorphize_path(&self, p: &Path) -> Path {
    use crate::path::PathData;
    match &*p.0 {
      PathData::Generic(g) => Path::generic(g.crate_name, g.components.clone(), self.monomorphize_params(&g.params)),
      PathData::InherentUfcs { self_ty, item, method_params, impl_params } => Path::inherent_ufcs(
        self.monomorphize_ty(self_ty), *item,
        self.monomorphize_params(method_params), self.monomorphize_params(impl_params),
      ),
      PathData::KnownUfcs { self_ty, trait_, item } => Path::known_ufcs(
        self.monomorphize_ty(self_ty),
        GenericPath { crate_name: trait_.crate_name, components: trait_.components.clone(), params: self.monomorphize_params(&trait_.params) },
        *item,
      ),
    }
  }

  /// Compose two substitutions: `self.compose(inner)` applied to a type is
  /// equivalent to applying `inner` and then `self` — used by the
  /// monomorphiser idempotence property in §8 (`monomorph(monomorph(body,
  /// A), B) == monomorph(body, compose(A, B))`), where `inner` (`A`) maps a
  /// template's parameters into an intermediate generic context and `self`
  /// (`B`) maps that context down to the final concrete types.
  #[must_use] pub fn compose(&self, inner: &Params) -> Params {
    Params {
      impl_params: self.monomorphize_params(&inner.impl_params),
      method_params: self.monomorphize_params(&inner.method_params),
      self_type: inner.self_type.as_ref().map(|t| self.monomorphize_ty(t)),
    }
  }
}

/// A monomorphised function instance: the template body plus the
/// substitution that produces this concrete copy of it.
pub struct FunctionInstance {
  /// The un-substituted template body (shared with every other instance of
  /// the same generic function).
  pub template: Rc<MirBody>,
  /// The substitution identifying this particular instance.
  pub params: Params,
  /// The fully monomorphised body, filled in once [`crate::monomorphise`]
  /// has run over `template`. `None` between enumeration discovering the
  /// instance and the monomorphisation pass processing it.
  pub monomorphised: Option<Rc<MirBody>>,
}

/// A monomorphised static instance.
pub struct StaticInstance {
  /// The substitution in effect (always [`Params::identity`] for statics,
  /// which cannot be generic, but kept for symmetry and future-proofing
  /// against per-crate-instantiation statics).
  pub params: Params,
}

/// A monomorphised const instance. Consts are always fully evaluated by the
/// frontend, so unlike functions there is no separate template/instance
/// split to track here — just the substitution used to resolve which
/// concrete const this path names.
pub struct ConstInstance {
  /// The substitution in effect.
  pub params: Params,
}

/// Whether a type was reached through an owning path (needs full layout)
/// or only through a pointer (a forward declaration suffices) — §4.4.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypeDepth {
  /// Declaration only; no field layout required yet.
  Shallow,
  /// Full layout required.
  Deep,
}

/// The enumeration output: every concrete item that must be emitted.
#[derive(Default)]
pub struct TransList {
  /// Concrete function instances, keyed by lifetime-erased path.
  pub functions: HashMap<PathKey, FunctionInstance>,
  /// Concrete static instances.
  pub statics: HashMap<PathKey, StaticInstance>,
  /// Concrete const instances.
  pub consts: HashMap<PathKey, ConstInstance>,
  /// Vtable paths that must be emitted (§4.3).
  pub vtables: HashMap<PathKey, (TypeRef, GenericPath)>,
  /// Every type reference discovered, and how deeply it was needed.
  pub types: HashMap<TypeRef, TypeDepth>,
  /// Types for which `core::any::type_id`-style identity statics are needed.
  pub type_ids: std::collections::HashSet<TypeRef>,
  /// Types in the auto-Clone synthesis set (§4.3).
  pub auto_clone: std::collections::HashSet<TypeRef>,
  /// Function-pointer types in the auto-`Fn`/`FnMut`/`FnOnce` synthesis set.
  pub auto_fn_ptr: std::collections::HashSet<TypeRef>,
  /// `<dyn Trait>::method` thunk paths that must be synthesised (§4.3).
  pub trait_object_thunks: HashMap<PathKey, (TypeRef, GenericPath, crate::symbol::Symbol)>,
  /// By-value-receiver vtable shim paths that must be synthesised (§4.3
  /// "VTable materialisation"): `(self_ty, trait_, method)` of the real
  /// method the shim tail-calls.
  pub by_value_shims: HashMap<PathKey, (TypeRef, GenericPath, crate::symbol::Symbol)>,
  /// Types needing synthesised drop glue (§4.3).
  pub drop_glue: std::collections::HashSet<TypeRef>,
  /// Tuple-struct/tuple-variant constructor shim paths (§4.6 emission step 5).
  pub constructors: HashMap<PathKey, TypeRef>,
  /// Materialised vtable contents, keyed the same way as [`TransList::vtables`].
  pub vtable_data: HashMap<PathKey, crate::literal::EncodedLiteral>,
  /// `extern` functions resolved to a declaration only (no local body),
  /// either because linkage resolution found the definition in another
  /// already-compiled crate or because it is genuinely external.
  pub externs: std::collections::HashSet<PathKey>,
  /// The ordered list of program roots, preserved for deterministic
  /// iteration order in codegen (not just for debugging: emission order
  /// within a category follows discovery order, §4.6).
  pub roots: Vec<Path>,
}

impl TransList {
  /// A fresh, empty list.
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Insert a function instance if its monomorphised path isn't already
  /// present. Returns `true` if this is a new instance (the caller should
  /// then scan its body and enqueue what it references).
  pub fn add_function(&mut self, path: &Path, template: Rc<MirBody>, params: Params) -> bool {
    let key = path.mono_key();
    if self.functions.contains_key(&key) { return false }
    self.functions.insert(key, FunctionInstance { template, params, monomorphised: None });
    true
  }

  /// Insert a static instance if new.
  pub fn add_static(&mut self, path: &Path, params: Params) -> bool {
    let key = path.mono_key();
    if self.statics.contains_key(&key) { return false }
    self.statics.insert(key, StaticInstance { params });
    true
  }

  /// Insert a const instance if new.
  pub fn add_const(&mut self, path: &Path, params: Params) -> bool {
    let key = path.mono_key();
    if self.consts.contains_key(&key) { return false }
    self.consts.insert(key, ConstInstance { params });
    true
  }

  /// Record a type reference, upgrading `Shallow` to `Deep` as needed but
  /// never downgrading (§4.4). Returns `true` if this is new information
  /// (a fresh type, or an upgrade) that the caller should act on.
  pub fn add_type(&mut self, ty: TypeRef, depth: TypeDepth) -> bool {
    match self.types.get(&ty).copied() {
      None => { self.types.insert(ty, depth); true }
      Some(TypeDepth::Deep) => false,
      Some(TypeDepth::Shallow) if depth == TypeDepth::Shallow => false,
      Some(TypeDepth::Shallow) => { self.types.insert(ty, TypeDepth::Deep); true }
    }
  }

  /// Record that a vtable for `(self_ty, trait_)` must be emitted. Returns
  /// `true` if this is new.
  pub fn add_vtable(&mut self, self_ty: TypeRef, trait_: GenericPath) -> bool {
    let path = Path::vtable(self_ty.clone(), trait_.clone());
    let key = path.mono_key();
    if self.vtables.contains_key(&key) { return false }
    self.vtables.insert(key, (self_ty, trait_));
    true
  }

  /// Record that `<dyn Trait>::method` needs a thunk. Returns `true` if new.
  pub fn add_trait_object_thunk(&mut self, trait_obj: TypeRef, trait_: GenericPath, method: crate::symbol::Symbol) -> bool {
    let path = Path::trait_object_thunk(trait_obj.clone(), trait_.clone(), method);
    let key = path.mono_key();
    if self.trait_object_thunks.contains_key(&key) { return false }
    self.trait_object_thunks.insert(key, (trait_obj, trait_, method));
    true
  }

  /// Record that `ty` needs synthesised drop glue. Returns `true` if new.
  pub fn add_drop_glue(&mut self, ty: TypeRef) -> bool { self.drop_glue.insert(ty) }

  /// Record that `<self_ty as trait_>::method`'s by-value-receiver vtable
  /// shim must be synthesised. Returns `true` if new.
  pub fn add_by_value_shim(&mut self, self_ty: TypeRef, trait_: GenericPath, method: crate::symbol::Symbol) -> bool {
    let path = Path::by_value_shim(self_ty.clone(), trait_.clone(), method);
    let key = path.mono_key();
    if self.by_value_shims.contains_key(&key) { return false }
    self.by_value_shims.insert(key, (self_ty, trait_, method));
    true
  }

  /// Total number of concrete value items (functions + statics + consts),
  /// used by the enumerator's progress reporting and by tests.
  #[must_use] pub fn value_item_count(&self) -> usize {
    self.functions.len() + self.statics.len() + self.consts.len()
  }
}

//! The enumeration engine (§4.1, §4.4): a work-queue walk from the
//! program's roots that discovers every concrete function, static, const,
//! vtable, trait-object thunk and auto-synthesised impl that must be
//! emitted, plus every type that must be declared or laid out to support
//! them.
//!
//! [`Enumerator`] owns the queue and a `&mut` [`TransList`]; it never scans
//! a template body itself — that's [`crate::scanner::scan`]'s job, cached
//! once per body in [`crate::mir::Function::cache`] and replayed under
//! every instantiation's substitution.

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::error::{Context, Result};
use crate::frontend::{LangItem, TypedCrate};
use crate::mir::{CallTarget, Function, Terminator};
use crate::path::{GenericPath, Path, PathData};
use crate::repr::LayoutOracle;
use crate::scanner;
use crate::symbol::{intern, Symbol};
use crate::target::TargetSpec;
use crate::trans_list::{Params, TransList, TypeDepth};
use crate::ty::{RefKind, TypeRef};

/// One unit of deferred work. Every arm, once processed, may push more
/// `WorkItem`s onto the queue; the walk terminates because
/// [`TransList`]'s `add_*` methods are idempotent and every concrete
/// program has finitely many reachable monomorphisations.
enum WorkItem {
  Function(Path),
  Static(Path),
  Const(Path),
  Type(TypeRef, TypeDepth),
  Vtable(TypeRef, GenericPath),
  TraitObjectThunk(TypeRef, GenericPath, Symbol),
  AutoClone(TypeRef),
  AutoFnPtr(TypeRef),
}

struct Enumerator<'a> {
  crate_: &'a dyn TypedCrate,
  oracle: &'a dyn LayoutOracle,
  target: &'a TargetSpec,
  list: &'a mut TransList,
  queue: VecDeque<WorkItem>,
}

fn clone_trait_matches(trait_: &GenericPath) -> bool {
  *trait_ == crate::auto_impls::clone_trait()
}

fn fn_family_item(item: Symbol) -> bool {
  matches!(item.as_str(), "call" | "call_mut" | "call_once")
}

pub(crate) fn drop_trait_path() -> GenericPath {
  GenericPath { crate_name: intern("core"), components: Rc::from([intern("ops"), intern("Drop")]), params: crate::path::PathParams::empty() }
}

impl<'a> Enumerator<'a> {
  fn new(crate_: &'a dyn TypedCrate, oracle: &'a dyn LayoutOracle, target: &'a TargetSpec, list: &'a mut TransList) -> Self {
    Self { crate_, oracle, target, list, queue: VecDeque::new() }
  }

  fn drain(&mut self) -> Result<()> {
    while let Some(item) = self.queue.pop_front() {
      match item {
        WorkItem::Function(path) => self.process_function(path)?,
        WorkItem::Static(path) => self.process_static(path)?,
        WorkItem::Const(path) => self.process_const(path)?,
        WorkItem::Type(ty, depth) => self.enqueue_type(ty, depth)?,
        WorkItem::Vtable(self_ty, trait_) => self.process_vtable(self_ty, trait_)?,
        WorkItem::TraitObjectThunk(obj, trait_, method) => self.process_thunk(obj, trait_, method)?,
        WorkItem::AutoClone(ty) => self.process_auto_clone(ty)?,
        WorkItem::AutoFnPtr(ty) => self.process_auto_fn_ptr(ty)?,
      }
    }
    Ok(())
  }

  /// Lang-item-tagged items are roots regardless of visibility (§4.1).
  /// Silently skipped if the lang item isn't a value item this crate can
  /// enumerate (e.g. the `Drop` trait's own path, never callable itself).
  fn seed_lang_items(&mut self) {
    for li in [LangItem::Start, LangItem::Drop, LangItem::BoxFree, LangItem::Clone, LangItem::PanicHandler, LangItem::CStyleStart] {
      let Some(path) = self.crate_.lang_item(li) else { continue };
      if self.crate_.lookup_function(&path).is_some() { self.queue.push_back(WorkItem::Function(path)); }
      else if self.crate_.lookup_static(&path).is_some() { self.queue.push_back(WorkItem::Static(path)); }
      else if self.crate_.lookup_const(&path).is_some() { self.queue.push_back(WorkItem::Const(path)); }
    }
  }

  fn process_function(&mut self, path: Path) -> Result<()> {
    let ctx = Context { function: Some(path.clone()), block: None, stmt: None };
    let params = Params::from_path(&path);
    let def = self.crate_.lookup_function(&path).ok_or_else(|| crate::bug!(ctx, "UnresolvedPath: no function definition for {path}"))?;

    if def.is_extern {
      if let Some(link_name) = &def.link_name {
        if let Some(resolved) = self.crate_.resolve_link_name(link_name) {
          self.queue.push_back(WorkItem::Function(resolved));
          return Ok(());
        }
      }
      if !self.list.externs.insert(path.mono_key()) { return Ok(()) }
      for arg in &def.sig.args { self.enqueue_type(params.monomorphize_ty(arg), TypeDepth::Shallow)?; }
      self.enqueue_type(params.monomorphize_ty(&def.sig.ret), TypeDepth::Shallow)?;
      return Ok(());
    }

    let template = def.body.clone().ok_or_else(|| crate::bug!(ctx, "function {path} has no body and is not extern"))?;
    if def.generic_count > 0 && def.visibility == crate::frontend::Visibility::Public {
      def.save_code.set(true);
    }
    if !self.list.add_function(&path, template.clone(), params.clone()) { return Ok(()) }

    let cache = {
      let mut slot = template.cache.borrow_mut();
      if slot.is_none() { *slot = Some(Rc::new(scanner::scan(&template, &def.sig.ret))); }
      slot.clone().expect("just filled")
    };
    for raw_path in &cache.paths {
      let mono = params.monomorphize_path(raw_path);
      self.enqueue_any_path(mono)?;
    }
    for (raw_ty, owned) in &cache.types {
      let mono = params.monomorphize_ty(raw_ty);
      self.enqueue_type(mono, if *owned { TypeDepth::Deep } else { TypeDepth::Shallow })?;
    }
    for ty in find_type_id_calls(&template) {
      let mono = params.monomorphize_ty(&ty);
      self.list.type_ids.insert(mono.clone());
      self.enqueue_type(mono, TypeDepth::Deep)?;
    }
    Ok(())
  }

  fn process_static(&mut self, path: Path) -> Result<()> {
    let ctx = Context { function: Some(path.clone()), block: None, stmt: None };
    let params = Params::from_path(&path);
    let def = self.crate_.lookup_static(&path).ok_or_else(|| crate::bug!(ctx, "UnresolvedPath: no static definition for {path}"))?;
    if !self.list.add_static(&path, params.clone()) { return Ok(()) }
    self.enqueue_type(params.monomorphize_ty(&def.ty), TypeDepth::Deep)?;
    if let Some(value) = &def.value {
      for p in value.referenced_paths() { self.enqueue_any_path(p.clone())?; }
    }
    Ok(())
  }

  fn process_const(&mut self, path: Path) -> Result<()> {
    let ctx = Context { function: Some(path.clone()), block: None, stmt: None };
    let params = Params::from_path(&path);
    let def = self.crate_.lookup_const(&path).ok_or_else(|| crate::bug!(ctx, "UnresolvedPath: no const definition for {path}"))?;
    if !self.list.add_const(&path, params.clone()) { return Ok(()) }
    self.enqueue_type(params.monomorphize_ty(&def.ty), TypeDepth::Deep)?;
    for p in def.value.referenced_paths() { self.enqueue_any_path(p.clone())?; }
    Ok(())
  }

  /// Classify a fully-monomorphised path discovered by the scanner and
  /// route it to the right work item: the synthetic shapes (`#drop_glue`,
  /// `#vtable`, a trait-object thunk, an auto-`Clone`/`FnPtr` impl) never
  /// appear in [`TypedCrate::lookup_function`], so they're recognised by
  /// the path's own shape before falling back to an ordinary lookup.
  fn enqueue_any_path(&mut self, path: Path) -> Result<()> {
    let ctx = Context { function: Some(path.clone()), block: None, stmt: None };
    match &*path.0 {
      PathData::InherentUfcs { self_ty, item, .. } if item.as_str() == "#drop_glue" => {
        self.enqueue_drop_glue((**self_ty).clone())
      }
      PathData::KnownUfcs { self_ty, trait_, item } if item.as_str() == "#vtable" => {
        self.queue.push_back(WorkItem::Vtable((**self_ty).clone(), trait_.clone()));
        Ok(())
      }
      PathData::KnownUfcs { self_ty, trait_, item } if matches!(**self_ty, TypeRef::TraitObject(..)) => {
        self.queue.push_back(WorkItem::TraitObjectThunk((**self_ty).clone(), trait_.clone(), *item));
        Ok(())
      }
      PathData::KnownUfcs { self_ty, trait_, item }
        if item.as_str() == "clone" && clone_trait_matches(trait_) && matches!(**self_ty, TypeRef::Tuple(_) | TypeRef::Array(..)) =>
      {
        self.queue.push_back(WorkItem::AutoClone((**self_ty).clone()));
        Ok(())
      }
      PathData::KnownUfcs { self_ty, item, .. } if fn_family_item(*item) && matches!(**self_ty, TypeRef::FnPtr(..)) => {
        self.queue.push_back(WorkItem::AutoFnPtr((**self_ty).clone()));
        Ok(())
      }
      _ => {
        if self.crate_.lookup_function(&path).is_some() { self.queue.push_back(WorkItem::Function(path)); return Ok(()) }
        if self.crate_.lookup_static(&path).is_some() { self.queue.push_back(WorkItem::Static(path)); return Ok(()) }
        if self.crate_.lookup_const(&path).is_some() { self.queue.push_back(WorkItem::Const(path)); return Ok(()) }
        // Neither a function, static, nor const: this is a bare nominal
        // type path, reached via Rvalue::Aggregate's struct/variant tag
        // (§4.2's scanner visits these as paths, not types). Registering
        // it doubles as discovering the type's tuple/unit-struct
        // constructor shim path (§4.6 emission step 5).
        if let PathData::Generic(_) = &*path.0 {
          self.list.constructors.insert(path.mono_key(), TypeRef::Path(path.clone()));
          return self.enqueue_type(TypeRef::Path(path), TypeDepth::Deep);
        }
        Err(crate::bug!(ctx, "UnresolvedPath: no definition found for {path}"))
      }
    }
  }

  fn enqueue_drop_glue(&mut self, ty: TypeRef) -> Result<()> {
    if !ty.is_owned_data() { return Ok(()) }
    self.list.add_drop_glue(ty);
    Ok(())
  }

  /// Record a type reference and, on first insertion or shallow→deep
  /// upgrade, recurse into whatever that depth demands (§4.4): the
  /// type's structural children always, plus — for a deep nominal type —
  /// its field layout from the oracle, its drop-glue requirement, an
  /// explicit `Drop` impl if one exists, and (for an owned box) the boxed
  /// allocator's free function.
  fn enqueue_type(&mut self, ty: TypeRef, depth: TypeDepth) -> Result<()> {
    let ctx = Context::none();
    if matches!(ty, TypeRef::Infer(_) | TypeRef::SelfPlaceholder) {
      return Err(crate::bug!(ctx, "GenericAfterMono: {ty} reached enumeration still generic"));
    }
    if !self.list.add_type(ty.clone(), depth) { return Ok(()) }
    self.enqueue_children(&ty, depth)?;

    if depth == TypeDepth::Deep {
      if ty.is_owned_data() { self.enqueue_drop_glue(ty.clone())?; }
      if let TypeRef::Borrow(RefKind::Owned, _) = &ty {
        if let Some(free) = self.crate_.lang_item(LangItem::BoxFree) {
          if self.crate_.lookup_function(&free).is_some() { self.queue.push_back(WorkItem::Function(free)); }
        }
      }
      if let TypeRef::Path(p) = &ty {
        let drop_path = Path::known_ufcs(ty.clone(), drop_trait_path(), intern("drop"));
        if self.crate_.lookup_function(&drop_path).is_some() { self.queue.push_back(WorkItem::Function(drop_path)); }
        let _ = p;
        let repr = self.oracle.type_repr(&ty)?;
        for f in &repr.fields { self.enqueue_type(f.ty.clone(), TypeDepth::Deep)?; }
        for variant in &repr.variant_fields { for f in variant { self.enqueue_type(f.ty.clone(), TypeDepth::Deep)?; } }
      }
    }
    Ok(())
  }

  fn enqueue_children(&mut self, ty: &TypeRef, depth: TypeDepth) -> Result<()> {
    match ty {
      TypeRef::Tuple(tys) => for t in tys.iter() { self.enqueue_type(t.clone(), depth)?; },
      TypeRef::Array(t, _) | TypeRef::Slice(t) => self.enqueue_type((**t).clone(), depth)?,
      TypeRef::Borrow(RefKind::Owned, t) => self.enqueue_type((**t).clone(), depth)?,
      TypeRef::Borrow(_, t) | TypeRef::Pointer(_, t) => self.enqueue_type((**t).clone(), TypeDepth::Shallow)?,
      TypeRef::FnPtr(args, ret) => {
        for a in args.iter() { self.enqueue_type(a.clone(), TypeDepth::Shallow)?; }
        self.enqueue_type((**ret).clone(), TypeDepth::Shallow)?;
      }
      TypeRef::Path(p) => for t in p.params().types.iter() { self.enqueue_type(t.clone(), depth)?; },
      TypeRef::NamedFunction(p) | TypeRef::TraitObject(p, _) =>
        for t in p.params().types.iter() { self.enqueue_type(t.clone(), TypeDepth::Shallow)?; },
      TypeRef::Primitive(_) | TypeRef::Erased(_) | TypeRef::Diverge => {}
      TypeRef::Infer(_) | TypeRef::SelfPlaceholder => unreachable!("checked by enqueue_type"),
    }
    Ok(())
  }

  fn process_vtable(&mut self, self_ty: TypeRef, trait_: GenericPath) -> Result<()> {
    if !self.list.add_vtable(self_ty.clone(), trait_.clone()) { return Ok(()) }
    self.enqueue_type(self_ty.clone(), TypeDepth::Deep)?;
    self.enqueue_drop_glue(self_ty.clone())?;
    for (owner, method) in crate::auto_impls::all_vtable_methods(&trait_, self.crate_) {
      let ctx = Context::none();
      let sig_path = Path::known_ufcs(TypeRef::SelfPlaceholder, owner.clone(), method);
      let sig = self.crate_.lookup_function(&sig_path)
        .ok_or_else(|| crate::bug!(ctx, "no abstract signature registered for {sig_path}"))?;
      // The real concrete method is always enumerated; the vtable slot
      // itself may point at a by-value-receiver shim that tail-calls it.
      self.queue.push_back(WorkItem::Function(Path::known_ufcs(self_ty.clone(), owner.clone(), method)));
      if crate::auto_impls::has_by_value_receiver(&sig.sig) {
        self.list.add_by_value_shim(self_ty.clone(), owner, method);
      }
    }
    Ok(())
  }

  fn process_thunk(&mut self, trait_obj: TypeRef, trait_: GenericPath, method: Symbol) -> Result<()> {
    if !self.list.add_trait_object_thunk(trait_obj.clone(), trait_, method) { return Ok(()) }
    self.enqueue_type(trait_obj, TypeDepth::Shallow)
  }

  fn process_auto_clone(&mut self, ty: TypeRef) -> Result<()> {
    let ctx = Context::none();
    if !self.list.auto_clone.insert(ty.clone()) { return Ok(()) }
    self.enqueue_type(ty.clone(), TypeDepth::Deep)?;
    let elems: Vec<TypeRef> = match &ty {
      TypeRef::Tuple(tys) => tys.to_vec(),
      TypeRef::Array(t, n) => std::iter::repeat((**t).clone()).take(*n as usize).collect(),
      _ => return Err(crate::bug!(ctx, "UnknownAutoImpl: auto-Clone requested for non-tuple/array type {ty}")),
    };
    for elem in elems {
      match &elem {
        TypeRef::Tuple(_) | TypeRef::Array(..) => self.process_auto_clone(elem)?,
        _ => self.queue.push_back(WorkItem::Function(Path::known_ufcs(elem, crate::auto_impls::clone_trait(), intern("clone")))),
      }
    }
    Ok(())
  }

  fn process_auto_fn_ptr(&mut self, ty: TypeRef) -> Result<()> {
    if !self.list.auto_fn_ptr.insert(ty.clone()) { return Ok(()) }
    self.enqueue_type(ty, TypeDepth::Shallow)
  }
}

/// Find every `type_id` intrinsic call in `f`'s (still-generic) blocks and
/// return its sole type argument. Not routed through [`crate::mir::EnumCache`]
/// because the cache only distinguishes path/type occurrences, not which
/// intrinsic a type argument came from; these bodies are small enough that
/// a dedicated scan per template costs nothing.
fn find_type_id_calls(f: &Function) -> Vec<TypeRef> {
  let mut out = Vec::new();
  for (_, block) in f.blocks.iter_enum() {
    if let Terminator::Call { target: CallTarget::Intrinsic(name, tys), .. } = &block.terminator {
      if name.as_str() == "type_id" { out.extend(tys.iter().cloned()); }
    }
  }
  out
}

/// Enumerate a binary-mode program: `main` plus the language start item are
/// the only roots (§4.1 "Root selection").
pub fn enumerate_binary(crate_: &dyn TypedCrate, oracle: &dyn LayoutOracle, target: &TargetSpec, list: &mut TransList) -> Result<()> {
  let (main, start) = crate_.binary_roots().ok_or_else(|| crate::error::Error::user("binary mode requires a `main` function"))?;
  list.roots.push(main.clone());
  list.roots.push(start.clone());
  let mut en = Enumerator::new(crate_, oracle, target, list);
  en.seed_lang_items();
  en.queue.push_back(WorkItem::Function(main));
  en.queue.push_back(WorkItem::Function(start));
  en.drain()
}

/// Enumerate a library-mode program: every globally visible value item and
/// every concrete impl item is a root (§4.1 "Root selection").
pub fn enumerate_library(crate_: &dyn TypedCrate, oracle: &dyn LayoutOracle, target: &TargetSpec, list: &mut TransList) -> Result<()> {
  let roots = crate_.library_roots();
  list.roots.extend(roots.iter().map(|r| r.path.clone()));
  let mut en = Enumerator::new(crate_, oracle, target, list);
  en.seed_lang_items();
  for root in roots { en.queue.push_back(WorkItem::Function(root.path)); }
  en.drain()
}

/// The cleanup pass (§4.1 "Cleanup pass"): after monomorphisation and
/// auto-impl synthesis may have rewritten bodies (dropping references an
/// earlier optimistic pass introduced), re-walk from the roots over the
/// now-concrete bodies and drop any function/static/const the walk no
/// longer reaches. Vtables, drop glues, trait-object thunks and auto-impl
/// sets are never subject to this cleanup — codegen must still find them
/// even if the walk no longer touches every installing call site directly
/// (§4.1: "re-inserted as placeholders so codegen can still find them").
pub fn cleanup(list: &mut TransList) -> Result<()> {
  let mut reachable_fns = HashSet::new();
  let mut reachable_statics = HashSet::new();
  let mut reachable_consts = HashSet::new();
  let mut queue: VecDeque<Path> = list.roots.iter().cloned().collect();

  while let Some(path) = queue.pop_front() {
    let key = path.mono_key();
    if reachable_fns.contains(&key) { continue }
    let Some(inst) = list.functions.get(&key) else { continue };
    reachable_fns.insert(key);
    let body = inst.monomorphised.as_ref().unwrap_or(&inst.template);
    let cache = scanner::scan(body, &TypeRef::unit());
    for p in &cache.paths {
      let k = p.mono_key();
      if list.functions.contains_key(&k) { queue.push_back(p.clone()); }
      else if list.statics.contains_key(&k) { reachable_statics.insert(k); }
      else if list.consts.contains_key(&k) { reachable_consts.insert(k); }
    }
  }

  list.functions.retain(|k, _| reachable_fns.contains(k));
  list.statics.retain(|k, _| reachable_statics.contains(k));
  list.consts.retain(|k, _| reachable_consts.contains(k));
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frontend::{ConcreteImplItem, FnSig, FunctionDef, TestCrate, Visibility};
  use crate::idx::{Idx, IdxVec};
  use crate::mir::{BasicBlock, LValue, LValueRoot, LocalDecl, LocalId};
  use crate::path::PathParams;
  use crate::repr::{FieldRepr, TypeRepr, UnsizedTail, VariantsRepr};
  use crate::span::FileSpan;
  use crate::ty::Primitive;
  use std::cell::Cell;

  fn sym(s: &str) -> Symbol { intern(s) }

  struct NullOracle;
  impl LayoutOracle for NullOracle {
    fn type_repr(&self, _ty: &TypeRef) -> Result<Rc<TypeRepr>> {
      Ok(Rc::new(TypeRepr { size: 8, align: 8, fields: Vec::new(), variants: VariantsRepr::None, variant_fields: Vec::new() }))
    }
    fn unsized_tail(&self, _ty: &TypeRef) -> Option<UnsizedTail> { None }
  }

  fn leaf_fn(ret: TypeRef) -> FunctionDef {
    let locals = IdxVec::<LocalId, LocalDecl>::new();
    let mut f = Function::new(locals, 0);
    let mut block = BasicBlock::incomplete();
    block.terminator = Terminator::Return;
    f.blocks.push(block);
    FunctionDef {
      sig: FnSig { args: vec![], ret },
      generic_count: 0,
      body: Some(Rc::new(f)),
      visibility: Visibility::Private,
      is_extern: false,
      link_name: None,
      lang_item: None,
      save_code: Cell::new(false),
    }
  }

  #[test]
  fn enumerate_binary_discovers_callee_and_type() {
    let mut crate_ = TestCrate::default();
    let callee_path = Path::generic(sym("krate"), [sym("helper")], PathParams::empty());
    let main_path = Path::generic(sym("krate"), [sym("main")], PathParams::empty());
    let start_path = Path::generic(sym("krate"), [sym("start")], PathParams::empty());

    crate_.functions.insert(callee_path.mono_key(), leaf_fn(TypeRef::Primitive(Primitive::I32)));

    let mut locals = IdxVec::<LocalId, LocalDecl>::new();
    locals.push(LocalDecl { ty: TypeRef::Primitive(Primitive::I32), span: FileSpan::synthetic(), name: None });
    let mut main_body = Function::new(locals, 0);
    let mut block = BasicBlock::incomplete();
    block.terminator = Terminator::Call {
      ret_lvalue: LValue::from_root(LValueRoot::Local(LocalId::new(0))),
      target: CallTarget::Path(callee_path.clone()),
      args: vec![],
      ret_bb: BlockId::ENTRY,
      panic_bb: BlockId::ENTRY,
    };
    main_body.blocks.push(block);
    let main_def = FunctionDef {
      sig: FnSig { args: vec![], ret: TypeRef::unit() },
      generic_count: 0,
      body: Some(Rc::new(main_body)),
      visibility: Visibility::Private,
      is_extern: false,
      link_name: None,
      lang_item: None,
      save_code: Cell::new(false),
    };
    crate_.functions.insert(main_path.mono_key(), main_def);
    crate_.functions.insert(start_path.mono_key(), leaf_fn(TypeRef::unit()));
    crate_.binary_roots = Some((main_path.clone(), start_path));

    let oracle = NullOracle;
    let target = TargetSpec::linux_x86_64();
    let mut list = TransList::new();
    enumerate_binary(&crate_, &oracle, &target, &mut list).unwrap();

    assert!(list.functions.contains_key(&main_path.mono_key()));
    assert!(list.functions.contains_key(&callee_path.mono_key()));
    assert!(list.types.contains_key(&TypeRef::Primitive(Primitive::I32)));
  }

  #[test]
  fn unresolved_path_is_reported_as_bug() {
    let crate_ = TestCrate::default();
    let missing = Path::generic(sym("krate"), [sym("nope")], PathParams::empty());
    let oracle = NullOracle;
    let target = TargetSpec::linux_x86_64();
    let mut list = TransList::new();
    let mut en = Enumerator::new(&crate_, &oracle, &target, &mut list);
    en.queue.push_back(WorkItem::Function(missing));
    let err = en.drain().unwrap_err();
    assert!(matches!(err, crate::error::Error::Bug { .. }));
  }

  #[test]
  fn library_roots_seed_every_concrete_impl_item() {
    let mut crate_ = TestCrate::default();
    let item_path = Path::known_ufcs(
      TypeRef::Primitive(Primitive::I32),
      GenericPath { crate_name: sym("krate"), components: Rc::from([sym("Trait")]), params: PathParams::empty() },
      sym("go"),
    );
    crate_.functions.insert(item_path.mono_key(), leaf_fn(TypeRef::unit()));
    crate_.library_roots.push(ConcreteImplItem { path: item_path.clone() });

    let oracle = NullOracle;
    let target = TargetSpec::linux_x86_64();
    let mut list = TransList::new();
    enumerate_library(&crate_, &oracle, &target, &mut list).unwrap();
    assert!(list.functions.contains_key(&item_path.mono_key()));
  }

  #[test]
  fn owned_struct_pulls_in_drop_glue_and_field_layout() {
    struct FieldOracle;
    impl LayoutOracle for FieldOracle {
      fn type_repr(&self, ty: &TypeRef) -> Result<Rc<TypeRepr>> {
        if let TypeRef::Path(_) = ty {
          Ok(Rc::new(TypeRepr {
            size: 8, align: 8,
            fields: vec![FieldRepr { offset: 0, ty: TypeRef::Borrow(RefKind::Owned, Rc::new(TypeRef::Primitive(Primitive::U8))) }],
            variants: VariantsRepr::None, variant_fields: Vec::new(),
          }))
        } else {
          Ok(Rc::new(TypeRepr { size: 1, align: 1, fields: Vec::new(), variants: VariantsRepr::None, variant_fields: Vec::new() }))
        }
      }
      fn unsized_tail(&self, _ty: &TypeRef) -> Option<UnsizedTail> { None }
    }

    let crate_ = TestCrate::default();
    let struct_ty = TypeRef::Path(Path::generic(sym("krate"), [sym("Owner")], PathParams::empty()));
    let oracle = FieldOracle;
    let target = TargetSpec::linux_x86_64();
    let mut list = TransList::new();
    let mut en = Enumerator::new(&crate_, &oracle, &target, &mut list);
    en.enqueue_type(struct_ty.clone(), TypeDepth::Deep).unwrap();

    assert!(list.drop_glue.contains(&struct_ty));
    assert!(list.types.contains_key(&TypeRef::Borrow(RefKind::Owned, Rc::new(TypeRef::Primitive(Primitive::U8)))));
  }

  #[test]
  fn cleanup_drops_functions_no_longer_reachable() {
    let mut list = TransList::new();
    let root = Path::generic(sym("krate"), [sym("main")], PathParams::empty());
    let dead = Path::generic(sym("krate"), [sym("dead")], PathParams::empty());
    let locals = IdxVec::<LocalId, LocalDecl>::new();
    let mut f = Function::new(locals, 0);
    f.blocks.push({ let mut b = BasicBlock::incomplete(); b.terminator = Terminator::Return; b });
    list.add_function(&root, Rc::new(f.clone()), Params::identity());
    list.add_function(&dead, Rc::new(f), Params::identity());
    list.roots.push(root.clone());

    cleanup(&mut list).unwrap();
    assert!(list.functions.contains_key(&root.mono_key()));
    assert!(!list.functions.contains_key(&dead.mono_key()));
  }
}

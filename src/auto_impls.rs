//! The auto-impl synthesiser (§4.3): generates MIR bodies and vtable data
//! for the handful of items no frontend ever writes down explicitly —
//! drop glue, compiler-derived `Clone` for tuples/arrays, vtables, and the
//! dynamic-dispatch thunk shared by every call through a trait object.
//!
//! Every function here is pure: given a type (and, for vtables/thunks, a
//! trait) plus read-only access to the typed crate and the layout oracle,
//! it returns a brand-new [`Function`]/[`EncodedLiteral`]. Caching and
//! insertion into the [`crate::trans_list::TransList`] is the enumerator's
//! job, not this module's.

use std::rc::Rc;

use crate::error::{Context, Result};
use crate::frontend::TypedCrate;
use crate::idx::{Idx, IdxVec};
use crate::literal::{EncodedLiteral, RelocTarget, Relocation};
use crate::mir::{
  BasicBlock, BlockId, CallTarget, DropKind, Function, LValue, LValueRoot, LValueWrapper,
  LocalDecl, LocalId, Operand, Rvalue, Statement, Terminator,
};
use crate::path::{GenericPath, Path, PathParams};
use crate::repr::{LayoutOracle, VariantsRepr};
use crate::span::FileSpan;
use crate::symbol::{intern, Symbol};
use crate::target::TargetSpec;
use crate::ty::{PtrKind, TypeRef};

fn synthetic_local(ty: TypeRef, name: &str) -> LocalDecl {
  LocalDecl { ty, span: FileSpan::synthetic(), name: Some(intern(name)) }
}

fn receiver_ty(ty: &TypeRef) -> TypeRef { TypeRef::Pointer(PtrKind::Mut, Rc::new(ty.clone())) }

/// Build `<Self>::#drop_glue`'s body: if `ty` has an explicit `Drop` impl,
/// call it first, then drop every field of `ty` in declaration order,
/// switching on the active variant first for an enum (§4.3: "Types with an
/// explicit `Drop` impl: first call the user's `drop`, then the
/// field-recursive walk"). Trivially-droppable fields are dropped too
/// (codegen is expected to fold a `Drop` of a type with no destructor to
/// nothing); this keeps the glue generator itself free of "does this type
/// actually need dropping" special cases.
pub fn synthesize_drop_glue(ty: &TypeRef, crate_: &dyn TypedCrate, oracle: &dyn LayoutOracle) -> Result<Function> {
  let mut locals = IdxVec::<LocalId, LocalDecl>::new();
  locals.push(synthetic_local(receiver_ty(ty), "self"));
  let mut f = Function::new(locals, 1);
  let self_place = LValue::from_root(LValueRoot::Local(LocalId::new(0))).deref();
  let repr = oracle.type_repr(ty)?;

  let explicit_drop = if let TypeRef::Path(_) = ty {
    let drop_path = Path::known_ufcs(ty.clone(), crate::enumerate::drop_trait_path(), intern("drop"));
    crate_.lookup_function(&drop_path).map(|_| drop_path)
  } else {
    None
  };

  // Reserve block 0 for the explicit-`drop` call, if any, so the structured
  // walk's entry point (which must be `BlockId::ENTRY`, §4.7) is still the
  // call when one exists; the field-recursive walk's own blocks are built
  // after it and wired in as its successor.
  let call_block_idx = explicit_drop.is_some().then(|| f.blocks.push(BasicBlock::incomplete()));

  let field_walk_entry = if matches!(repr.variants, VariantsRepr::None) {
    let mut block = BasicBlock::incomplete();
    for (i, _) in repr.fields.iter().enumerate() {
      block.statements.push(Statement::Drop { kind: DropKind::Deep, lvalue: self_place.clone().field(i as u32), flag: None });
    }
    block.terminator = Terminator::Return;
    f.blocks.push(block)
  } else {
    let entry = f.blocks.push(BasicBlock::incomplete());
    let mut arms = Vec::new();
    for (vi, fields) in repr.variant_fields.iter().enumerate() {
      let mut block = BasicBlock::incomplete();
      for (i, _) in fields.iter().enumerate() {
        let mut place = self_place.clone();
        place.wrappers.push(LValueWrapper::Downcast(vi as u32));
        place.wrappers.push(LValueWrapper::Field(i as u32));
        block.statements.push(Statement::Drop { kind: DropKind::Deep, lvalue: place, flag: None });
      }
      block.terminator = Terminator::Return;
      arms.push(f.blocks.push(block));
    }
    f.blocks[entry].terminator = Terminator::Switch(self_place.clone(), arms);
    entry
  };

  if let (Some(drop_path), Some(call_idx)) = (explicit_drop, call_block_idx) {
    let self_ref_local = f.locals.push(synthetic_local(TypeRef::Borrow(crate::ty::RefKind::Mut, Rc::new(ty.clone())), "self_ref"));
    let unit_ret_local = f.locals.push(synthetic_local(TypeRef::unit(), "drop_ret"));
    f.blocks[call_idx].statements.push(Statement::Assign(LValue::local(self_ref_local), Rvalue::Ref(crate::ty::RefKind::Mut, self_place)));
    f.blocks[call_idx].terminator = Terminator::Call {
      ret_lvalue: LValue::local(unit_ret_local),
      target: CallTarget::Path(drop_path),
      args: vec![Operand::Move(LValue::local(self_ref_local))],
      ret_bb: field_walk_entry,
      panic_bb: field_walk_entry,
    };
  }
  Ok(f)
}

/// The well-known path of `core::clone::Clone`, used both to build the
/// synthesised impl's own method paths and, by [`crate::enumerate`], to
/// recognise a `<tuple/array as Clone>::clone` path as one the enumerator
/// must route to [`synthesize_clone`] rather than look up in the frontend.
#[must_use] pub fn clone_trait() -> GenericPath {
  GenericPath { crate_name: intern("core"), components: Rc::from([intern("clone"), intern("Clone")]), params: PathParams::empty() }
}

/// Build `<Self as Clone>::clone` for a tuple or fixed-size array, the two
/// composite shapes a frontend can never attach a `#[derive(Clone)]`-style
/// impl to directly. Each field/element is cloned individually through its
/// own (possibly also synthesised) `Clone::clone` and reassembled.
pub fn synthesize_clone(ty: &TypeRef) -> Result<Function> {
  let ctx = Context::none();
  let (elem_tys, kind): (Vec<TypeRef>, _) = match ty {
    TypeRef::Tuple(tys) => (tys.to_vec(), crate::mir::AggregateKind::Tuple),
    TypeRef::Array(t, n) => (std::iter::repeat((**t).clone()).take(*n as usize).collect(), crate::mir::AggregateKind::Array((**t).clone())),
    _ => return Err(crate::bug!(ctx, "synthesize_clone called on non-tuple/array type {ty}")),
  };
  let mut locals = IdxVec::<LocalId, LocalDecl>::new();
  locals.push(synthetic_local(TypeRef::Borrow(crate::ty::RefKind::Shared, Rc::new(ty.clone())), "self"));
  let field_ret_locals: Vec<LocalId> = elem_tys.iter().map(|t| locals.push(synthetic_local(t.clone(), "field"))).collect();
  let mut f = Function::new(locals, 1);
  let self_place = LValue::from_root(LValueRoot::Local(LocalId::new(0)));
  let trait_ = clone_trait();

  let mut block = BasicBlock::incomplete();
  let ret_place = LValue::from_root(LValueRoot::Return);
  let mut elements = Vec::new();
  for (i, (elem_ty, ret_local)) in elem_tys.iter().zip(&field_ret_locals).enumerate() {
    let field_ref = Rvalue::Ref(crate::ty::RefKind::Shared, self_place.clone().field(i as u32));
    let tmp_ref_local = f.locals.push(synthetic_local(
      TypeRef::Borrow(crate::ty::RefKind::Shared, Rc::new(elem_ty.clone())), "field_ref",
    ));
    block.statements.push(Statement::Assign(LValue::local(tmp_ref_local), field_ref));
    f.blocks.push(std::mem::replace(&mut block, BasicBlock::incomplete()));
    let prev = BlockId::new(f.blocks.len() - 1);
    let next = BlockId::new(f.blocks.len());
    f.blocks[prev].terminator = Terminator::Call {
      ret_lvalue: LValue::local(*ret_local),
      target: CallTarget::Path(Path::known_ufcs(elem_ty.clone(), trait_.clone(), intern("clone"))),
      args: vec![Operand::Move(LValue::local(tmp_ref_local))],
      ret_bb: next,
      panic_bb: next,
    };
    elements.push(Operand::Move(LValue::local(*ret_local)));
  }
  block.statements.push(Statement::Assign(ret_place, Rvalue::Aggregate(kind, elements)));
  block.terminator = Terminator::Return;
  f.blocks.push(block);
  Ok(f)
}

/// Synthesise `<FnPtrTy as Fn/FnMut/FnOnce>::call*`: a one-line forwarding
/// shim so that a bare function pointer can satisfy a closure trait bound
/// (§4.3's auto-`FnPtr`-trait-impl set). The three closure traits differ
/// only in the receiver's borrow kind, never in what the body does, so one
/// generator covers all three; the caller picks the path/trait name.
pub fn synthesize_fn_ptr_shim(fn_ptr_ty: &TypeRef) -> Result<Function> {
  let ctx = Context::none();
  let args = match fn_ptr_ty {
    TypeRef::FnPtr(args, _) => args.clone(),
    _ => return Err(crate::bug!(ctx, "synthesize_fn_ptr_shim called on non-fn-pointer type {fn_ptr_ty}")),
  };
  let mut locals = IdxVec::<LocalId, LocalDecl>::new();
  locals.push(synthetic_local(fn_ptr_ty.clone(), "self"));
  let arg_locals: Vec<LocalId> = args.iter().map(|t| locals.push(synthetic_local(t.clone(), "arg"))).collect();
  let mut f = Function::new(locals, 1 + arg_locals.len());
  let mut block = BasicBlock::incomplete();
  block.terminator = Terminator::Call {
    ret_lvalue: LValue::from_root(LValueRoot::Return),
    target: CallTarget::Value(LValue::local(LocalId::new(0))),
    args: arg_locals.iter().map(|l| Operand::Move(LValue::local(*l))).collect(),
    ret_bb: BlockId::ENTRY,
    panic_bb: BlockId::ENTRY,
  };
  f.blocks.push(block);
  Ok(f)
}

fn write_uint_le(bytes: &mut [u8], offset: usize, width: usize, value: u64) {
  bytes[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
}

/// `true` if `sig`'s first argument is `Self` taken by value rather than by
/// reference — such a method cannot be called through the uniform
/// `fn(&mut data, ...)` vtable slot shape directly and needs
/// [`synthesize_by_value_shim`] instead.
#[must_use] pub fn has_by_value_receiver(sig: &crate::frontend::FnSig) -> bool {
  matches!(sig.args.first(), Some(TypeRef::SelfPlaceholder))
}

/// Build the vtable-callable shim for a method whose receiver is `Self` by
/// value: `fn(&mut Self, args...) -> Ret` that moves `*self` out and
/// tail-calls the real by-value method. Grounded on the same
/// load-args-and-tail-call shape as [`synthesize_fn_ptr_shim`].
pub fn synthesize_by_value_shim(self_ty: &TypeRef, trait_: &GenericPath, method: Symbol, crate_: &dyn TypedCrate) -> Result<Function> {
  let ctx = Context::none();
  let sig_path = Path::known_ufcs(TypeRef::SelfPlaceholder, trait_.clone(), method);
  let sig = crate_.lookup_function(&sig_path)
    .ok_or_else(|| crate::bug!(ctx, "no abstract signature registered for {sig_path}"))?;
  let forwarded_args: Vec<TypeRef> = sig.sig.args.iter().skip(1).cloned().collect();

  let mut locals = IdxVec::<LocalId, LocalDecl>::new();
  locals.push(synthetic_local(receiver_ty(self_ty), "self"));
  let arg_locals: Vec<LocalId> = forwarded_args.iter().map(|t| locals.push(synthetic_local(t.clone(), "arg"))).collect();
  let mut f = Function::new(locals, 1 + arg_locals.len());
  let self_place = LValue::local(LocalId::new(0)).deref();
  let mut block = BasicBlock::incomplete();
  block.terminator = Terminator::Call {
    ret_lvalue: LValue::from_root(LValueRoot::Return),
    target: CallTarget::Path(Path::known_ufcs(self_ty.clone(), trait_.clone(), method)),
    args: std::iter::once(Operand::Move(self_place))
      .chain(arg_locals.iter().map(|l| Operand::Move(LValue::local(*l))))
      .collect(),
    ret_bb: BlockId::ENTRY,
    panic_bb: BlockId::ENTRY,
  };
  f.blocks.push(block);
  Ok(f)
}

/// Build the contents of `<self_ty as trait_>::#vtable`: a fixed header
/// (drop glue pointer, size, alignment) followed by one function-pointer
/// slot per trait method in [`TypedCrate::value_indexes`] order — "the
/// index N in the vtable is 3 + N" (§4.3). Parent-trait methods are
/// appended after `trait_`'s own, resolved by name against `self_ty`
/// exactly as the frontend would for a direct call.
pub fn synthesize_vtable(
  self_ty: &TypeRef, trait_: &GenericPath, crate_: &dyn TypedCrate, oracle: &dyn LayoutOracle, target: &TargetSpec,
) -> Result<EncodedLiteral> {
  let ptr = target.pointer_size() as usize;
  let methods = all_vtable_methods(trait_, crate_);
  let mut lit = EncodedLiteral::zeroed(ptr * (3 + methods.len()));
  lit.relocations.push(Relocation { offset: 0, length: ptr as u32, target: RelocTarget::Path(Path::drop_glue(self_ty.clone())) });
  let repr = oracle.type_repr(self_ty)?;
  write_uint_le(&mut lit.bytes, ptr, ptr, repr.size);
  write_uint_le(&mut lit.bytes, ptr * 2, ptr, repr.align);
  for (i, (owner, method)) in methods.iter().enumerate() {
    let sig_path = Path::known_ufcs(TypeRef::SelfPlaceholder, owner.clone(), *method);
    let by_value = crate_.lookup_function(&sig_path).is_some_and(|d| has_by_value_receiver(&d.sig));
    let slot_path = if by_value {
      Path::by_value_shim(self_ty.clone(), owner.clone(), *method)
    } else {
      Path::known_ufcs(self_ty.clone(), owner.clone(), *method)
    };
    let offset = (ptr * (3 + i)) as u32;
    lit.relocations.push(Relocation { offset, length: ptr as u32, target: RelocTarget::Path(slot_path) });
  }
  Ok(lit)
}

/// `trait_`'s own methods followed by every parent trait's methods,
/// recursively, each tagged with the trait that declares it (so the
/// concrete impl can be looked up by name against `self_ty`). Exposed to
/// [`crate::enumerate`] so vtable enumeration and vtable-content synthesis
/// agree on slot order without duplicating the parent-trait walk.
pub(crate) fn all_vtable_methods(trait_: &GenericPath, crate_: &dyn TypedCrate) -> Vec<(GenericPath, Symbol)> {
  let mut out: Vec<(GenericPath, Symbol)> = crate_.value_indexes(trait_).iter().map(|m| (trait_.clone(), *m)).collect();
  for parent in crate_.parent_traits(trait_) { out.extend(all_vtable_methods(parent, crate_)); }
  out
}

/// The fixed `TypeRef` used as the `Self` type of every dynamic-dispatch
/// thunk for `trait_`: there is exactly one thunk per `(trait, method)`
/// pair, shared by every concrete implementor, so its path must not
/// depend on any particular implementing type.
#[must_use] pub fn thunk_self_type(trait_: &GenericPath) -> TypeRef {
  let trait_path = Path::generic(trait_.crate_name, trait_.components.clone(), trait_.params.clone());
  TypeRef::TraitObject(trait_path, crate::ty::AutoTraits::empty())
}

/// Build `<dyn Trait>::method`: given `(data_ptr, vtable_ptr, args...)`,
/// load the method's slot out of the vtable and make an indirect call.
/// This is the single function every `obj.method(args)` call through a
/// trait-object receiver compiles to; dispatch to the right concrete
/// implementation happens entirely through the vtable's own contents.
pub fn synthesize_trait_object_thunk(
  trait_: &GenericPath, method: Symbol, crate_: &dyn TypedCrate, target: &TargetSpec,
) -> Result<Function> {
  let ctx = Context::none();
  let slot = all_vtable_methods(trait_, crate_).iter().position(|(_, m)| *m == method)
    .ok_or_else(|| crate::bug!(ctx, "method {method} not found in vtable layout for trait {trait_}"))?;
  let sig_path = Path::known_ufcs(TypeRef::SelfPlaceholder, trait_.clone(), method);
  let sig = crate_.lookup_function(&sig_path)
    .ok_or_else(|| crate::bug!(ctx, "no abstract signature registered for {sig_path}"))?;
  let forwarded_args: Vec<TypeRef> = sig.sig.args.iter().skip(1).cloned().collect();
  let fn_ptr_ty = TypeRef::FnPtr(
    std::iter::once(TypeRef::Pointer(PtrKind::Mut, Rc::new(TypeRef::unit()))).chain(forwarded_args.iter().cloned()).collect(),
    Rc::new(sig.sig.ret.clone()),
  );

  let mut locals = IdxVec::<LocalId, LocalDecl>::new();
  let data_local = locals.push(synthetic_local(TypeRef::Pointer(PtrKind::Mut, Rc::new(TypeRef::unit())), "data"));
  let vtable_local = locals.push(synthetic_local(TypeRef::Pointer(PtrKind::Const, Rc::new(TypeRef::unit())), "vtable"));
  let arg_locals: Vec<LocalId> = forwarded_args.iter().map(|t| locals.push(synthetic_local(t.clone(), "arg"))).collect();
  let fn_local = locals.push(synthetic_local(fn_ptr_ty, "method"));
  let mut f = Function::new(locals, 2 + arg_locals.len());

  let vtable_place = LValue::local(vtable_local).deref();
  let slot_ptr_ty = TypeRef::Pointer(PtrKind::Const, Rc::new(TypeRef::unit()));
  let mut block = BasicBlock::incomplete();
  block.statements.push(Statement::Assign(
    LValue::local(fn_local),
    Rvalue::Cast(crate::mir::CastKind::PtrToPtr, Operand::Copy(vtable_place.field(u32::try_from(3 + slot).unwrap())), slot_ptr_ty),
  ));
  f.blocks.push(block);
  f.blocks[BlockId::ENTRY].terminator = Terminator::Call {
    ret_lvalue: LValue::from_root(LValueRoot::Return),
    target: CallTarget::Value(LValue::local(fn_local)),
    args: std::iter::once(Operand::Move(LValue::local(data_local)))
      .chain(arg_locals.iter().map(|l| Operand::Move(LValue::local(*l))))
      .collect(),
    ret_bb: BlockId::ENTRY,
    panic_bb: BlockId::ENTRY,
  };
  Ok(f)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frontend::{generic_path_key, FnSig, FunctionDef, TestCrate, Visibility};
  use crate::repr::{FieldRepr, TypeRepr, UnsizedTail};
  use crate::ty::{Primitive, RefKind};
  use std::cell::Cell;

  fn sym(s: &str) -> Symbol { intern(s) }

  fn struct_ty(name: &str) -> TypeRef { TypeRef::Path(Path::generic(sym("krate"), [sym(name)], PathParams::empty())) }

  /// One struct field of the given type at consecutive 8-byte offsets, no
  /// discriminant — enough layout for the tests below, which only care
  /// about field count and order.
  struct FieldOracle(Vec<TypeRef>);
  impl LayoutOracle for FieldOracle {
    fn type_repr(&self, ty: &TypeRef) -> Result<Rc<TypeRepr>> {
      if matches!(ty, TypeRef::Path(_)) {
        let fields = self.0.iter().enumerate().map(|(i, t)| FieldRepr { offset: i as u64 * 8, ty: t.clone() }).collect();
        Ok(Rc::new(TypeRepr { size: self.0.len() as u64 * 8, align: 8, fields, variants: VariantsRepr::None, variant_fields: Vec::new() }))
      } else {
        Ok(Rc::new(TypeRepr { size: 8, align: 8, fields: Vec::new(), variants: VariantsRepr::None, variant_fields: Vec::new() }))
      }
    }
    fn unsized_tail(&self, _ty: &TypeRef) -> Option<UnsizedTail> { None }
  }

  struct EnumOracle(Vec<Vec<TypeRef>>);
  impl LayoutOracle for EnumOracle {
    fn type_repr(&self, _ty: &TypeRef) -> Result<Rc<TypeRepr>> {
      let variant_fields = self.0.iter().map(|vt| {
        vt.iter().enumerate().map(|(i, t)| FieldRepr { offset: i as u64 * 8, ty: t.clone() }).collect()
      }).collect();
      Ok(Rc::new(TypeRepr {
        size: 16, align: 8, fields: Vec::new(),
        variants: VariantsRepr::Values { field_path: vec![0], values: (0..self.0.len() as i128).collect() },
        variant_fields,
      }))
    }
    fn unsized_tail(&self, _ty: &TypeRef) -> Option<UnsizedTail> { None }
  }

  fn drop_def() -> FunctionDef {
    let locals = IdxVec::<LocalId, LocalDecl>::new();
    let mut f = Function::new(locals, 1);
    let mut block = BasicBlock::incomplete();
    block.terminator = Terminator::Return;
    f.blocks.push(block);
    FunctionDef {
      sig: FnSig { args: vec![TypeRef::Borrow(RefKind::Mut, Rc::new(TypeRef::SelfPlaceholder))], ret: TypeRef::unit() },
      generic_count: 0,
      body: Some(Rc::new(f)),
      visibility: Visibility::Private,
      is_extern: false,
      link_name: None,
      lang_item: None,
      save_code: Cell::new(false),
    }
  }

  fn count_drop_statements(f: &Function) -> usize {
    f.blocks.iter().flat_map(|b| &b.statements).filter(|s| matches!(s, Statement::Drop { .. })).count()
  }

  fn count_calls(f: &Function) -> usize {
    f.blocks.iter().filter(|b| matches!(b.terminator, Terminator::Call { .. })).count()
  }

  #[test]
  fn plain_struct_drop_glue_drops_every_field_with_no_call() {
    let ty = struct_ty("Plain");
    let oracle = FieldOracle(vec![TypeRef::Primitive(Primitive::U8), TypeRef::Primitive(Primitive::U8)]);
    let crate_ = TestCrate::default();
    let f = synthesize_drop_glue(&ty, &crate_, &oracle).unwrap();
    assert_eq!(count_drop_statements(&f), 2);
    assert_eq!(count_calls(&f), 0);
    assert!(matches!(f.blocks[BlockId::ENTRY].terminator, Terminator::Return));
  }

  #[test]
  fn explicit_drop_impl_is_called_before_the_field_walk() {
    // `(A, B)`-style type where `A` has an explicit `Drop`: the glue must
    // call `A::drop` first, then fall through to the field-recursive walk
    // (§4.3), matching Scenario 1's "calls `A::drop` on field 0... returns".
    let ty = struct_ty("HasDrop");
    let mut crate_ = TestCrate::default();
    let drop_path = Path::known_ufcs(ty.clone(), crate::enumerate::drop_trait_path(), sym("drop"));
    crate_.functions.insert(drop_path.mono_key(), drop_def());
    let oracle = FieldOracle(vec![TypeRef::Primitive(Primitive::U8)]);

    let f = synthesize_drop_glue(&ty, &crate_, &oracle).unwrap();
    assert_eq!(count_calls(&f), 1);
    assert_eq!(count_drop_statements(&f), 1);
    // The call must be the function's entry block, reached before any
    // field drop runs.
    match &f.blocks[BlockId::ENTRY].terminator {
      Terminator::Call { target: CallTarget::Path(p), ret_bb, .. } => {
        assert_eq!(*p, drop_path);
        assert!(f.blocks[*ret_bb].statements.iter().any(|s| matches!(s, Statement::Drop { .. })));
      }
      other => panic!("expected a Call terminator in the entry block, got {other:?}"),
    }
  }

  #[test]
  fn type_with_no_explicit_drop_impl_never_emits_a_call() {
    let ty = struct_ty("NoDrop");
    let crate_ = TestCrate::default();
    let oracle = FieldOracle(vec![TypeRef::Primitive(Primitive::U8)]);
    let f = synthesize_drop_glue(&ty, &crate_, &oracle).unwrap();
    assert_eq!(count_calls(&f), 0);
  }

  #[test]
  fn enum_drop_glue_switches_on_variant_then_drops_each_arms_fields() {
    let ty = struct_ty("Choice");
    let crate_ = TestCrate::default();
    let oracle = EnumOracle(vec![vec![TypeRef::Primitive(Primitive::U8)], vec![TypeRef::Primitive(Primitive::U8), TypeRef::Primitive(Primitive::U8)]]);
    let f = synthesize_drop_glue(&ty, &crate_, &oracle).unwrap();
    assert!(matches!(f.blocks[BlockId::ENTRY].terminator, Terminator::Switch(_, _)));
    assert_eq!(count_drop_statements(&f), 3);
  }

  #[test]
  fn clone_glue_clones_and_reassembles_every_tuple_element() {
    let ty = TypeRef::Tuple(Rc::from([TypeRef::Primitive(Primitive::U8), TypeRef::Primitive(Primitive::U32)]));
    let f = synthesize_clone(&ty).unwrap();
    let call_count = f.blocks.iter().filter(|b| matches!(b.terminator, Terminator::Call { .. })).count();
    assert_eq!(call_count, 2);
    let last = f.blocks.iter().last().unwrap();
    assert!(matches!(last.statements.last(), Some(Statement::Assign(_, Rvalue::Aggregate(crate::mir::AggregateKind::Tuple, elems))) if elems.len() == 2));
  }

  #[test]
  fn clone_glue_rejects_non_tuple_non_array_types() {
    let ty = struct_ty("NotCloneable");
    assert!(synthesize_clone(&ty).is_err());
  }

  fn method_def(args: Vec<TypeRef>, ret: TypeRef) -> FunctionDef {
    let locals = IdxVec::<LocalId, LocalDecl>::new();
    let mut f = Function::new(locals, args.len());
    let mut block = BasicBlock::incomplete();
    block.terminator = Terminator::Return;
    f.blocks.push(block);
    FunctionDef {
      sig: FnSig { args, ret },
      generic_count: 0,
      body: Some(Rc::new(f)),
      visibility: Visibility::Private,
      is_extern: false,
      link_name: None,
      lang_item: None,
      save_code: Cell::new(false),
    }
  }

  fn test_trait() -> GenericPath {
    GenericPath { crate_name: sym("krate"), components: Rc::from([sym("Speak")]), params: PathParams::empty() }
  }

  #[test]
  fn vtable_has_drop_glue_size_align_header_and_one_slot_per_method() {
    let trait_ = test_trait();
    let self_ty = struct_ty("Dog");
    let mut crate_ = TestCrate::default();
    crate_.value_indexes.insert(generic_path_key(&trait_), vec![sym("bark")]);
    crate_.functions.insert(
      Path::known_ufcs(TypeRef::SelfPlaceholder, trait_.clone(), sym("bark")).mono_key(),
      method_def(vec![TypeRef::Borrow(RefKind::Shared, Rc::new(TypeRef::SelfPlaceholder))], TypeRef::unit()),
    );
    let oracle = FieldOracle(vec![]);
    let target = TargetSpec::linux_x86_64();
    let ptr = target.pointer_size() as usize;

    let lit = synthesize_vtable(&self_ty, &trait_, &crate_, &oracle, &target).unwrap();
    assert_eq!(lit.bytes.len(), ptr * 4);
    assert_eq!(lit.relocations.len(), 2);
    assert!(matches!(&lit.relocations[0].target, RelocTarget::Path(p) if *p == Path::drop_glue(self_ty.clone())));
    assert_eq!(lit.relocations[1].offset, (ptr * 3) as u32);
  }

  #[test]
  fn vtable_slot_for_a_by_value_method_points_at_its_shim() {
    let trait_ = test_trait();
    let self_ty = struct_ty("Dog");
    let mut crate_ = TestCrate::default();
    crate_.value_indexes.insert(generic_path_key(&trait_), vec![sym("into_sound")]);
    crate_.functions.insert(
      Path::known_ufcs(TypeRef::SelfPlaceholder, trait_.clone(), sym("into_sound")).mono_key(),
      method_def(vec![TypeRef::SelfPlaceholder], TypeRef::unit()),
    );
    let oracle = FieldOracle(vec![]);
    let target = TargetSpec::linux_x86_64();

    let lit = synthesize_vtable(&self_ty, &trait_, &crate_, &oracle, &target).unwrap();
    let expected = Path::by_value_shim(self_ty.clone(), trait_.clone(), sym("into_sound"));
    assert!(matches!(&lit.relocations[1].target, RelocTarget::Path(p) if *p == expected));
  }

  #[test]
  fn by_value_shim_moves_self_out_and_tail_calls_the_real_method() {
    let trait_ = test_trait();
    let self_ty = struct_ty("Dog");
    let mut crate_ = TestCrate::default();
    crate_.functions.insert(
      Path::known_ufcs(TypeRef::SelfPlaceholder, trait_.clone(), sym("into_sound")).mono_key(),
      method_def(vec![TypeRef::SelfPlaceholder, TypeRef::Primitive(Primitive::I32)], TypeRef::unit()),
    );
    let f = synthesize_by_value_shim(&self_ty, &trait_, sym("into_sound"), &crate_).unwrap();
    assert_eq!(f.locals.len(), 2); // self pointer + 1 forwarded arg
    match &f.blocks[BlockId::ENTRY].terminator {
      Terminator::Call { target: CallTarget::Path(p), args, .. } => {
        assert_eq!(*p, Path::known_ufcs(self_ty, trait_, sym("into_sound")));
        assert_eq!(args.len(), 2);
      }
      other => panic!("expected a Call terminator, got {other:?}"),
    }
  }

  #[test]
  fn trait_object_thunk_loads_the_right_vtable_slot_and_calls_through_it() {
    let trait_ = test_trait();
    let mut crate_ = TestCrate::default();
    crate_.value_indexes.insert(generic_path_key(&trait_), vec![sym("bark"), sym("fetch")]);
    crate_.functions.insert(
      Path::known_ufcs(TypeRef::SelfPlaceholder, trait_.clone(), sym("fetch")).mono_key(),
      method_def(vec![TypeRef::Borrow(RefKind::Mut, Rc::new(TypeRef::SelfPlaceholder)), TypeRef::Primitive(Primitive::I32)], TypeRef::unit()),
    );
    let target = TargetSpec::linux_x86_64();
    let f = synthesize_trait_object_thunk(&trait_, sym("fetch"), &crate_, &target).unwrap();

    // slot = 3 + 1 (fetch is the second method, index 1).
    let load = f.blocks[BlockId::ENTRY].statements.iter().find_map(|s| match s {
      Statement::Assign(_, Rvalue::Cast(_, Operand::Copy(lv), _)) => Some(lv.clone()),
      _ => None,
    }).expect("thunk must load its method pointer out of the vtable");
    assert!(matches!(load.wrappers.last(), Some(LValueWrapper::Field(4))));
    assert!(matches!(f.blocks[BlockId::ENTRY].terminator, Terminator::Call { target: CallTarget::Value(_), .. }));
  }

  #[test]
  fn fn_ptr_shim_forwards_every_argument_and_tail_calls_through_self() {
    let fn_ty = TypeRef::FnPtr(Rc::from([TypeRef::Primitive(Primitive::I32), TypeRef::Primitive(Primitive::Bool)]), Rc::new(TypeRef::unit()));
    let f = synthesize_fn_ptr_shim(&fn_ty).unwrap();
    assert_eq!(f.locals.len(), 3);
    match &f.blocks[BlockId::ENTRY].terminator {
      Terminator::Call { target: CallTarget::Value(_), args, .. } => assert_eq!(args.len(), 2),
      other => panic!("expected a Call terminator, got {other:?}"),
    }
  }
}

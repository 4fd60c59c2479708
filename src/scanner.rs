//! The MIR scanner (§4.2): a pure traversal over a function body that
//! yields every [`Path`] and [`TypeRef`] occurrence to a visitor.
//!
//! The scanner makes no policy decisions of its own — no deduplication, no
//! "have we seen this before", no recursion-termination bookkeeping. It
//! just walks the body once, in a fixed order, and calls back. All of
//! that policy lives in [`crate::enumerate`], which implements
//! [`MirVisitor`] to build a [`crate::trans_list::TransList`]. Keeping the
//! walk itself free of policy is what lets [`crate::mir::EnumCache`] be
//! filled in once per template body and then cheaply replayed under a new
//! substitution instead of re-walking every statement.

use crate::mir::{
  AggregateKind, BasicBlock, CallTarget, ConstVal, Function, InlineAsm, LValue, LValueRoot,
  Operand, Rvalue, Statement, Terminator,
};
use crate::path::Path;
use crate::ty::{RefKind, TypeRef};

/// Whether a [`TypeRef`] occurrence needs that type's full layout (it is
/// stored by value here) or only a forward declaration (it is only reached
/// through a pointer indirection at this occurrence).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypeOcc {
  /// Stored by value: locals, aggregate fields, cast results.
  Owned,
  /// Reached only through `&`/`*`/`fn(...)`: a forward declaration suffices
  /// for *this* occurrence (another occurrence elsewhere may still demand
  /// [`TypeOcc::Owned`], which is [`crate::trans_list::TransList::add_type`]'s
  /// job to reconcile).
  Shallow,
}

/// Callbacks invoked once per occurrence during [`walk_function`]. Default
/// bodies are no-ops so implementors only override what they care about.
pub trait MirVisitor {
  /// A function, static, const, vtable, or constructor path referenced by
  /// the body.
  fn visit_path(&mut self, _path: &Path) {}
  /// A type referenced by the body, and how deeply.
  fn visit_type(&mut self, _ty: &TypeRef, _occ: TypeOcc) {}
}

/// Walk `ty` and every type structurally nested inside it, propagating
/// `occ` through owning composites (tuples, arrays, slices, `Box`) and
/// downgrading to [`TypeOcc::Shallow`] through indirections (`&`, `*`,
/// `fn(...)`).
pub fn walk_type(v: &mut impl MirVisitor, ty: &TypeRef, occ: TypeOcc) {
  v.visit_type(ty, occ);
  match ty {
    TypeRef::Tuple(tys) => for t in tys.iter() { walk_type(v, t, occ) },
    TypeRef::Array(t, _) | TypeRef::Slice(t) => walk_type(v, t, occ),
    TypeRef::Borrow(RefKind::Owned, t) => walk_type(v, t, occ),
    TypeRef::Borrow(_, t) | TypeRef::Pointer(_, t) => walk_type(v, t, TypeOcc::Shallow),
    TypeRef::FnPtr(args, ret) => {
      for a in args.iter() { walk_type(v, a, TypeOcc::Shallow); }
      walk_type(v, ret, TypeOcc::Shallow);
    }
    TypeRef::Path(p) => for t in p.params().types.iter() { walk_type(v, t, occ) },
    TypeRef::NamedFunction(p) => for t in p.params().types.iter() { walk_type(v, t, TypeOcc::Shallow) },
    TypeRef::TraitObject(p, _) => for t in p.params().types.iter() { walk_type(v, t, TypeOcc::Shallow) },
    TypeRef::Primitive(_) | TypeRef::Erased(_) | TypeRef::Diverge
    | TypeRef::Infer(_) | TypeRef::SelfPlaceholder => {}
  }
}

fn walk_lvalue(v: &mut impl MirVisitor, lvalue: &LValue) {
  if let LValueRoot::Static(p) = &lvalue.root { v.visit_path(p); }
}

fn walk_const(v: &mut impl MirVisitor, c: &ConstVal) {
  match c {
    ConstVal::Int(..) | ConstVal::Bool(_) | ConstVal::Float(..) | ConstVal::Str(_) => {}
    ConstVal::ZeroSized(ty) => walk_type(v, ty, TypeOcc::Owned),
    ConstVal::ItemAddr(p) | ConstVal::Global(p) => v.visit_path(p),
  }
}

fn walk_operand(v: &mut impl MirVisitor, op: &Operand) {
  match op {
    Operand::Copy(l) | Operand::Move(l) => walk_lvalue(v, l),
    Operand::Constant(c) => walk_const(v, c),
  }
}

fn walk_rvalue(v: &mut impl MirVisitor, rv: &Rvalue) {
  match rv {
    Rvalue::Use(op) | Rvalue::Repeat(op, _) => walk_operand(v, op),
    Rvalue::Ref(_, l) | Rvalue::DstMeta(l) | Rvalue::DstPtr(l) => walk_lvalue(v, l),
    Rvalue::Cast(_, op, ty) => { walk_operand(v, op); walk_type(v, ty, TypeOcc::Owned); }
    Rvalue::BinaryOp(_, a, b) => { walk_operand(v, a); walk_operand(v, b); }
    Rvalue::UnaryOp(_, a) => walk_operand(v, a),
    Rvalue::MakeDst(a, b, ty) => { walk_operand(v, a); walk_operand(v, b); walk_type(v, ty, TypeOcc::Owned); }
    Rvalue::Aggregate(kind, ops) => {
      for op in ops { walk_operand(v, op); }
      match kind {
        AggregateKind::Tuple => {}
        AggregateKind::Array(ty) => walk_type(v, ty, TypeOcc::Owned),
        AggregateKind::Struct(p) | AggregateKind::Variant(p, _) => v.visit_path(p),
      }
    }
  }
}

fn walk_asm(v: &mut impl MirVisitor, asm: &InlineAsm) {
  for (_, l) in &asm.outputs { walk_lvalue(v, l); }
  for (_, op) in &asm.inputs { walk_operand(v, op); }
}

fn walk_statement(v: &mut impl MirVisitor, stmt: &Statement) {
  match stmt {
    Statement::Assign(l, rv) => { walk_lvalue(v, l); walk_rvalue(v, rv); }
    Statement::Drop { lvalue, .. } => walk_lvalue(v, lvalue),
    Statement::SetDropFlag { .. } | Statement::ScopeEnd(_) => {}
    Statement::Asm(asm) => walk_asm(v, asm),
  }
}

fn walk_terminator(v: &mut impl MirVisitor, term: &Terminator) {
  match term {
    Terminator::Incomplete | Terminator::Return | Terminator::Diverge
    | Terminator::Goto(_) | Terminator::Panic(_) => {}
    Terminator::If(op, _, _) => walk_operand(v, op),
    Terminator::Switch(l, _) => walk_lvalue(v, l),
    Terminator::SwitchValue(l, _values, _, _) => walk_lvalue(v, l),
    Terminator::Call { ret_lvalue, target, args, .. } => {
      walk_lvalue(v, ret_lvalue);
      match target {
        CallTarget::Value(l) => walk_lvalue(v, l),
        CallTarget::Path(p) => v.visit_path(p),
        CallTarget::Intrinsic(_, tys) => for ty in tys { walk_type(v, ty, TypeOcc::Owned); },
      }
      for arg in args { walk_operand(v, arg); }
    }
  }
}

fn walk_block(v: &mut impl MirVisitor, block: &BasicBlock) {
  if !block.reachable { return }
  for stmt in &block.statements { walk_statement(v, stmt); }
  walk_terminator(v, &block.terminator);
}

/// Walk every local, the return slot, and every reachable block of `f`,
/// calling back into `v`. `ret_ty` is supplied separately because the
/// return slot's type lives in the function's signature, not in
/// [`Function::locals`] (see [`Function`]'s doc comment).
pub fn walk_function(v: &mut impl MirVisitor, f: &Function, ret_ty: &TypeRef) {
  walk_type(v, ret_ty, TypeOcc::Owned);
  for (_, local) in f.locals.iter_enum() { walk_type(v, &local.ty, TypeOcc::Owned); }
  for (_, block) in f.blocks.iter_enum() { walk_block(v, block); }
}

/// Build a [`crate::mir::EnumCache`] by walking `f` once. This is the
/// scanner's only exported "do it all" entry point; [`crate::enumerate`]
/// calls this the first time it sees a template body, then replays the
/// resulting paths/types under each instance's substitution instead of
/// walking the body again.
#[must_use] pub fn scan(f: &Function, ret_ty: &TypeRef) -> crate::mir::EnumCache {
  struct Collector { paths: Vec<Path>, types: Vec<(TypeRef, bool)> }
  impl MirVisitor for Collector {
    fn visit_path(&mut self, path: &Path) { self.paths.push(path.clone()); }
    fn visit_type(&mut self, ty: &TypeRef, occ: TypeOcc) { self.types.push((ty.clone(), occ == TypeOcc::Owned)); }
  }
  let mut c = Collector { paths: Vec::new(), types: Vec::new() };
  walk_function(&mut c, f, ret_ty);
  crate::mir::EnumCache { paths: c.paths, types: c.types }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::idx::{Idx, IdxVec};
  use crate::mir::{BlockId, LocalDecl, LocalId};
  use crate::span::FileSpan;
  use crate::ty::Primitive;

  fn sym(s: &str) -> crate::symbol::Symbol { crate::symbol::intern(s) }

  #[test]
  fn scan_collects_static_and_call_paths() {
    let mut locals = IdxVec::<LocalId, LocalDecl>::new();
    locals.push(LocalDecl { ty: TypeRef::Primitive(Primitive::I32), span: FileSpan::synthetic(), name: None });
    let mut f = Function::new(locals, 0);
    let callee = Path::generic(sym("krate"), [sym("helper")], crate::path::PathParams::empty());
    let statik = Path::generic(sym("krate"), [sym("COUNTER")], crate::path::PathParams::empty());
    let entry = BasicBlock {
      statements: vec![Statement::Assign(
        LValue::from_root(LValueRoot::Local(LocalId::new(0))),
        Rvalue::Use(Operand::Constant(ConstVal::Global(statik.clone()))),
      )],
      terminator: Terminator::Call {
        ret_lvalue: LValue::from_root(LValueRoot::Local(LocalId::new(0))),
        target: CallTarget::Path(callee.clone()),
        args: vec![],
        ret_bb: BlockId::ENTRY,
        panic_bb: BlockId::ENTRY,
      },
      reachable: true,
    };
    f.blocks.push(entry);
    let cache = scan(&f, &TypeRef::unit());
    assert!(cache.paths.iter().any(|p| *p == statik));
    assert!(cache.paths.iter().any(|p| *p == callee));
  }
}

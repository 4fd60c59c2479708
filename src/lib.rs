//! `transcc`: the monomorphisation, auto-impl synthesis, and C codegen
//! backend for an ownership-based systems language compiler (§1, §2).
//!
//! This crate is the *core* of a larger compiler. The lexer, parser, macro
//! expander, name resolver, and type checker that produce a [`frontend::TypedCrate`],
//! the command-line driver, and the layout engine behind [`repr::LayoutOracle`]
//! are all external collaborators (§1) — a real driver links this crate in,
//! builds those three inputs plus a [`target::TargetSpec`], and calls
//! [`compile_crate`].
//!
//! The pipeline (§2) is linear:
//!
//! ```text
//! TypedCrate -> Enumerate -> Monomorphise -> AutoImpls -> Cleanup -> Codegen
//! ```
//!
//! [`compile_crate`] runs every stage in order and hands back a finished
//! [`codegen::GeneratedSource`]: C source text plus the host-compiler
//! command line. It never shells out itself — invoking the downstream C
//! toolchain is the driver's job (§1, §6).

pub mod auto_impls;
pub mod codegen;
pub mod enumerate;
pub mod error;
pub mod frontend;
pub mod idx;
pub mod literal;
pub mod mangle;
pub mod mir;
pub mod monomorphise;
pub mod path;
pub mod repr;
pub mod scanner;
pub mod span;
pub mod structured;
pub mod symbol;
pub mod target;
pub mod trans_list;
pub mod ty;

use crate::codegen::{Codegen, CodegenOptions, GeneratedSource};
use crate::error::Result;
use crate::frontend::TypedCrate;
use crate::repr::LayoutOracle;
use crate::target::TargetSpec;
use crate::trans_list::TransList;

/// Which of §4.1's two root-selection rules applies.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CompileMode {
  /// Roots are `main` plus the language `start` item.
  Binary,
  /// Roots are every globally visible value item plus every concrete impl
  /// item.
  Library,
}

/// Run enumeration, monomorphisation, auto-impl synthesis, and the cleanup
/// re-walk, leaving `list` ready for [`codegen`]. Exposed separately from
/// [`compile_crate`] so a caller that wants to inspect or post-process the
/// finalised [`TransList`] (e.g. to print statistics, or to run the
/// structured-MIR pass over a subset of bodies) doesn't have to re-run the
/// first four stages.
pub fn build_trans_list(
  crate_: &dyn TypedCrate, oracle: &dyn LayoutOracle, target: &TargetSpec, mode: CompileMode,
) -> Result<TransList> {
  let mut list = TransList::new();

  log::info!("enumerating {mode:?} roots");
  match mode {
    CompileMode::Binary => enumerate::enumerate_binary(crate_, oracle, target, &mut list)?,
    CompileMode::Library => enumerate::enumerate_library(crate_, oracle, target, &mut list)?,
  }
  log::debug!("enumeration reached {} value items, {} types", list.value_item_count(), list.types.len());

  monomorphise_all(&mut list, crate_)?;

  log::info!("synthesising vtable contents for {} vtable(s)", list.vtables.len());
  synthesize_vtable_contents(&mut list, crate_, oracle, target)?;

  log::info!("re-walking for cleanup");
  enumerate::cleanup(&mut list)?;
  log::debug!("cleanup retained {} value items", list.value_item_count());

  Ok(list)
}

/// The monomorphisation stage (§2, §4.5): fill in [`trans_list::FunctionInstance::monomorphised`]
/// for every function the enumerator discovered, by running
/// [`monomorphise::monomorphise`] over each template body under its
/// recorded [`trans_list::Params`]. Idempotent: a function instance whose
/// `monomorphised` field is already set (e.g. because [`build_trans_list`]
/// is called twice against the same list, which it never legitimately is,
/// but tests do) is left alone.
fn monomorphise_all(list: &mut TransList, crate_: &dyn TypedCrate) -> Result<()> {
  for inst in list.functions.values_mut() {
    if inst.monomorphised.is_some() { continue }
    let body = monomorphise::monomorphise(&inst.template, &inst.params, crate_);
    inst.monomorphised = Some(std::rc::Rc::new(body));
  }
  Ok(())
}

/// The auto-impl synthesiser's vtable-content pass (§4.3 "VTable
/// materialisation"): every `(self_ty, trait_)` pair the enumerator
/// recorded in [`TransList::vtables`] gets its byte contents built and
/// cached in [`TransList::vtable_data`] so codegen never re-derives it.
/// Drop glue, `Clone` shims, `Fn*` shims and trait-object thunks are
/// synthesised lazily by [`codegen`] itself (they are pure functions of a
/// single type/trait and cheap to rebuild on demand); vtable contents are
/// the one auto-impl product that must exist *before* codegen runs,
/// because [`codegen::Codegen::generate`] only borrows `&TransList`.
fn synthesize_vtable_contents(
  list: &mut TransList, crate_: &dyn TypedCrate, oracle: &dyn LayoutOracle, target: &TargetSpec,
) -> Result<()> {
  let keys: Vec<_> = list.vtables.keys().cloned().collect();
  for key in keys {
    if list.vtable_data.contains_key(&key) { continue }
    let (self_ty, trait_) = list.vtables[&key].clone();
    let lit = auto_impls::synthesize_vtable(&self_ty, &trait_, crate_, oracle, target)?;
    list.vtable_data.insert(key, lit);
  }
  Ok(())
}

/// Run the whole pipeline (§2) and produce the final C translation unit
/// plus the host-compiler command line. This is the crate's single public
/// entry point; a driver that only wants the [`TransList`] (e.g. to feed a
/// different backend) should call [`build_trans_list`] directly instead.
pub fn compile_crate(
  crate_: &dyn TypedCrate, oracle: &dyn LayoutOracle, target: &TargetSpec, mode: CompileMode,
  codegen_opts: &CodegenOptions,
) -> Result<GeneratedSource> {
  let list = build_trans_list(crate_, oracle, target, mode)?;
  log::info!("emitting C for {} function(s), {} static(s)", list.functions.len(), list.statics.len());
  let codegen = Codegen::new(&list, crate_, oracle, target);
  codegen.generate(codegen_opts)
}

impl std::fmt::Debug for CompileMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self { CompileMode::Binary => "binary", CompileMode::Library => "library" })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codegen::{CodegenOptions, EntryKind, LoweringStrategy, OutputKind};
  use crate::frontend::{FnSig, FunctionDef, LangItem, TestCrate, Visibility};
  use crate::idx::IdxVec;
  use crate::mir::{BasicBlock, Function, LocalDecl};
  use crate::path::Path;
  use crate::repr::{TypeRepr, UnsizedTail, VariantsRepr};
  use crate::span::FileSpan;
  use crate::symbol::intern;
  use crate::ty::{Primitive, TypeRef};

  struct FixedOracle;
  impl LayoutOracle for FixedOracle {
    fn type_repr(&self, ty: &TypeRef) -> Result<std::rc::Rc<TypeRepr>> {
      let size = match ty {
        TypeRef::Primitive(p) => p.fixed_size().unwrap_or(8),
        _ => 8,
      };
      Ok(std::rc::Rc::new(TypeRepr { size, align: size.min(8).max(1), fields: Vec::new(), variants: VariantsRepr::None, variant_fields: Vec::new() }))
    }
    fn unsized_tail(&self, _ty: &TypeRef) -> Option<UnsizedTail> { None }
  }

  /// A minimal binary-mode crate: `fn main() -> i32 { 0 }` plus a `start`
  /// lang item that just calls through, exercising the whole pipeline
  /// end-to-end without any generics, drop glue, or trait objects.
  fn trivial_binary_crate() -> TestCrate {
    let mut crate_ = TestCrate::default();
    let main_path = Path::generic(intern("test"), std::rc::Rc::from([intern("main")]), crate::path::PathParams::empty());
    let start_path = Path::generic(intern("core"), std::rc::Rc::from([intern("rt"), intern("start")]), crate::path::PathParams::empty());

    let mut main_body = Function::new(IdxVec::from_raw(vec![
      LocalDecl { ty: TypeRef::Primitive(Primitive::I32), span: FileSpan::synthetic(), name: None },
    ]), 0);
    let mut bb = BasicBlock::incomplete();
    bb.terminator = crate::mir::Terminator::Return;
    main_body.blocks.push(bb);

    crate_.functions.insert(main_path.mono_key(), FunctionDef {
      sig: FnSig { args: Vec::new(), ret: TypeRef::Primitive(Primitive::I32) },
      generic_count: 0, body: Some(std::rc::Rc::new(main_body)), visibility: Visibility::Public,
      is_extern: false, link_name: None, lang_item: None, save_code: std::cell::Cell::new(false),
    });

    let mut start_body = Function::new(IdxVec::from_raw(vec![
      LocalDecl { ty: TypeRef::Primitive(Primitive::I32), span: FileSpan::synthetic(), name: None },
    ]), 0);
    let mut sbb = BasicBlock::incomplete();
    sbb.terminator = crate::mir::Terminator::Return;
    start_body.blocks.push(sbb);
    crate_.functions.insert(start_path.mono_key(), FunctionDef {
      sig: FnSig { args: Vec::new(), ret: TypeRef::Primitive(Primitive::I32) },
      generic_count: 0, body: Some(std::rc::Rc::new(start_body)), visibility: Visibility::Public,
      is_extern: false, link_name: None, lang_item: Some(LangItem::Start), save_code: std::cell::Cell::new(false),
    });
    crate_.lang_items.insert(LangItem::Start, start_path.clone());
    crate_.binary_roots = Some((main_path, start_path));
    crate_
  }

  #[test]
  fn full_pipeline_emits_c_for_trivial_binary() {
    let crate_ = trivial_binary_crate();
    let oracle = FixedOracle;
    let target = TargetSpec::linux_x86_64();
    let opts = CodegenOptions {
      entry: EntryKind::LangStart, output_kind: OutputKind::Executable, output_path: "a.out".into(),
      strategy: LoweringStrategy::Flat, debug_info: false, compiler: None,
    };
    let generated = compile_crate(&crate_, &oracle, &target, CompileMode::Binary, &opts).unwrap();
    assert!(generated.source.contains("stdint.h"));
    assert_eq!(generated.command.program, "cc");
  }

  #[test]
  fn build_trans_list_monomorphises_every_discovered_function() {
    let crate_ = trivial_binary_crate();
    let oracle = FixedOracle;
    let target = TargetSpec::linux_x86_64();
    let list = build_trans_list(&crate_, &oracle, &target, CompileMode::Binary).unwrap();
    assert!(list.functions.values().all(|f| f.monomorphised.is_some()));
    assert!(!list.functions.is_empty());
  }

  #[test]
  fn library_mode_requires_no_main() {
    let mut crate_ = TestCrate::default();
    let item_path = Path::generic(intern("test"), std::rc::Rc::from([intern("f")]), crate::path::PathParams::empty());
    let mut body = Function::new(IdxVec::new(), 0);
    let mut bb = BasicBlock::incomplete();
    bb.terminator = crate::mir::Terminator::Return;
    body.blocks.push(bb);
    crate_.functions.insert(item_path.mono_key(), FunctionDef {
      sig: FnSig { args: Vec::new(), ret: TypeRef::unit() },
      generic_count: 0, body: Some(std::rc::Rc::new(body)), visibility: Visibility::Public,
      is_extern: false, link_name: None, lang_item: None, save_code: std::cell::Cell::new(false),
    });
    crate_.library_roots.push(crate::frontend::ConcreteImplItem { path: item_path });

    let oracle = FixedOracle;
    let target = TargetSpec::linux_x86_64();
    let list = build_trans_list(&crate_, &oracle, &target, CompileMode::Library).unwrap();
    assert_eq!(list.functions.len(), 1);
  }

  #[test]
  fn binary_mode_without_main_is_a_user_error() {
    let crate_ = TestCrate::default();
    let oracle = FixedOracle;
    let target = TargetSpec::linux_x86_64();
    let err = build_trans_list(&crate_, &oracle, &target, CompileMode::Binary).unwrap_err();
    assert!(!err.is_internal());
  }
}

//! MIR: the core's working representation (§3).
//!
//! A [`Function`] is a control-flow graph of [`BasicBlock`]s over a table
//! of typed [`LocalDecl`]s. Every statement and terminator is one arm of a
//! small tagged union (`Statement`, `Rvalue`, `Terminator`, ...) per the
//! "sum types via tagged variants" design note — visitors are expected to
//! match exhaustively rather than rely on a virtual dispatch hierarchy.

use std::cell::RefCell;
use std::rc::Rc;
use crate::idx::{Idx, IdxVec};
use crate::mk_idx;
use crate::path::Path;
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::ty::{RefKind, TypeRef, Primitive};

mk_idx! {
  /// Index of a local slot (arguments and locals share this index space;
  /// `Function::arg_count` says how many of the leading locals are args).
  pub struct LocalId;
}
mk_idx! {
  /// Index of a basic block.
  pub struct BlockId;
}

impl BlockId {
  /// Every function body's entry point is block 0.
  pub const ENTRY: BlockId = BlockId(0);
}

/// A typed storage slot: one of the function's locals.
#[derive(Clone, Debug)]
pub struct LocalDecl {
  /// The local's type. May contain [`TypeRef::Infer`] before monomorphisation.
  pub ty: TypeRef,
  /// Where this local was introduced, for diagnostics.
  pub span: FileSpan,
  /// A human-readable name, if the local corresponds to a named source
  /// binding rather than a compiler temporary.
  pub name: Option<Symbol>,
}

/// An operand: a value consumed by an [`Rvalue`] or [`Terminator`].
#[derive(Clone, Debug)]
pub enum Operand {
  /// Read a place without invalidating it (the place's type must be `Copy`).
  Copy(LValue),
  /// Read a place, invalidating it (drop flags downstream are set false).
  Move(LValue),
  /// A compile-time constant.
  Constant(ConstVal),
}

/// A compile-time constant value, as it appears inline in MIR (as opposed
/// to a full [`crate::literal::EncodedLiteral`], which is how *statics* and
/// *consts* are represented once lowered to data).
#[derive(Clone, Debug)]
pub enum ConstVal {
  /// An integer of the given primitive width/signedness.
  Int(i128, Primitive),
  /// A boolean.
  Bool(bool),
  /// Bit pattern of a float of the given width (`F32`/`F64`).
  Float(u64, Primitive),
  /// A byte-string literal (the data behind a `&[u8]`/`&str` constant).
  Str(Rc<[u8]>),
  /// The unique value of a zero-sized type.
  ZeroSized(TypeRef),
  /// The address of a function item or static — scanned by the enumerator
  /// as an `ItemAddr` reference (§4.1 step 3).
  ItemAddr(Path),
  /// A reference to a named static or const global (its value lives in a
  /// [`crate::literal::EncodedLiteral`] elsewhere in the [`crate::trans_list::TransList`]).
  Global(Path),
}

/// A storage location: a root plus a left-to-right chain of wrappers.
#[derive(Clone, Debug)]
pub struct LValue {
  /// The base location.
  pub root: LValueRoot,
  /// Applied left to right: `root.wrappers[0].wrappers[1]...`.
  pub wrappers: Vec<LValueWrapper>,
}

impl LValue {
  /// A bare root with no wrappers.
  #[must_use] pub fn from_root(root: LValueRoot) -> Self { Self { root, wrappers: Vec::new() } }
  /// A bare local, the most common case.
  #[must_use] pub fn local(id: LocalId) -> Self { Self::from_root(LValueRoot::Local(id)) }
  /// Append a wrapper, consuming and returning `self` for chaining.
  #[must_use] pub fn field(mut self, idx: u32) -> Self { self.wrappers.push(LValueWrapper::Field(idx)); self }
  /// Append a deref wrapper.
  #[must_use] pub fn deref(mut self) -> Self { self.wrappers.push(LValueWrapper::Deref); self }
}

/// The root of an [`LValue`].
#[derive(Clone, Debug)]
pub enum LValueRoot {
  /// The function's return slot.
  Return,
  /// The `i`th argument.
  Argument(u32),
  /// A local temporary or named binding.
  Local(LocalId),
  /// A `static` item, referenced directly (not through a pointer).
  Static(Path),
}

/// A single step applied to an [`LValue`] root.
#[derive(Clone, Debug)]
pub enum LValueWrapper {
  /// Project out a struct/tuple/union field by index.
  Field(u32),
  /// Dereference a pointer or borrow.
  Deref,
  /// Index by the value currently held in a local (bounds already checked
  /// upstream; this is the raw, unchecked array/slice index operation).
  Index(LocalId),
  /// Reinterpret an enum place as one specific variant's payload, after a
  /// `Switch` has established which variant is active.
  Downcast(u32),
}

/// How thoroughly a value is destroyed by a [`Statement::Drop`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DropKind {
  /// Recursively drop the value and all of its owned fields.
  Deep,
  /// Drop only this level (used when fields have already been moved out
  /// individually and only the container's own resources remain).
  Shallow,
}

/// A MIR statement: the non-control-flow contents of a basic block.
#[derive(Clone, Debug)]
pub enum Statement {
  /// Evaluate `rvalue` and store it into `lvalue`.
  Assign(LValue, Rvalue),
  /// Run drop glue (or not, per `flag`) on `lvalue`.
  Drop {
    /// Deep or shallow drop.
    kind: DropKind,
    /// The place to drop.
    lvalue: LValue,
    /// If `Some`, only drop when the named drop flag is currently set.
    flag: Option<u32>,
  },
  /// Update a drop flag's runtime value.
  SetDropFlag {
    /// Index into [`Function::drop_flags`].
    idx: u32,
    /// The new value.
    new_value: bool,
    /// If `Some`, only set it if this other flag currently holds `new_value`
    /// (used to propagate a flag across a move of an already-tracked value).
    other: Option<u32>,
  },
  /// Inline target assembly; opaque to everything except codegen's
  /// translation layer.
  Asm(InlineAsm),
  /// Marks the end of a lexical scope, for debuginfo only; codegen may
  /// drop this statement entirely.
  ScopeEnd(u32),
}

/// An inline-assembly statement. The instruction text and the register
/// binding are target-syntax already (GCC vs. MSVC translation happens in
/// codegen, §4.6).
#[derive(Clone, Debug)]
pub struct InlineAsm {
  /// The assembly template string, in the *source* language's dialect.
  pub template: Rc<str>,
  /// Output operands: (constraint, place).
  pub outputs: Vec<(Rc<str>, LValue)>,
  /// Input operands: (constraint, operand).
  pub inputs: Vec<(Rc<str>, Operand)>,
  /// Clobbered registers.
  pub clobbers: Vec<Rc<str>>,
}

/// A value-producing expression.
#[derive(Clone, Debug)]
pub enum Rvalue {
  /// Just read an operand.
  Use(Operand),
  /// Build a `[value; count]` array by replicating one operand.
  Repeat(Operand, u64),
  /// Take a (non-owning) reference to a place.
  Ref(RefKind, LValue),
  /// Reinterpret or convert a value to a different type.
  Cast(CastKind, Operand, TypeRef),
  /// A binary operator application.
  BinaryOp(BinOp, Operand, Operand),
  /// A unary operator application.
  UnaryOp(UnOp, Operand),
  /// Extract the metadata half of a fat-pointer place.
  DstMeta(LValue),
  /// Extract the data-pointer half of a fat-pointer place.
  DstPtr(LValue),
  /// Construct a fat pointer of type `ty` from a thin pointer and metadata.
  MakeDst(Operand, Operand, TypeRef),
  /// Build an aggregate (tuple/array/struct/enum-variant) from its fields.
  Aggregate(AggregateKind, Vec<Operand>),
}

/// What kind of aggregate an [`Rvalue::Aggregate`] builds.
#[derive(Clone, Debug)]
pub enum AggregateKind {
  /// A tuple literal.
  Tuple,
  /// A fixed-size array literal of element type `ty`.
  Array(TypeRef),
  /// A struct literal, naming the struct's type path.
  Struct(Path),
  /// An enum variant literal, naming the enum's type path and the variant index.
  Variant(Path, u32),
}

/// A cast/coercion kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CastKind {
  /// Integer-to-integer, truncating or sign/zero-extending.
  IntToInt,
  /// Integer-to-float.
  IntToFloat,
  /// Float-to-integer, saturating per the source language's cast semantics.
  FloatToInt,
  /// Float-to-float.
  FloatToFloat,
  /// Raw pointer to raw pointer (same or different pointee), thin-to-thin only.
  PtrToPtr,
  /// A named-function item or closure coerced to a matching `fn` pointer.
  FnPtrCast,
  /// Sized-to-unsized coercion (`[T; N]` to `[T]`, `S` to `dyn Trait`);
  /// lowered together with an accompanying [`Rvalue::MakeDst`] upstream,
  /// or directly when the metadata is statically known (array length).
  Unsize,
}

/// A binary operator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
  Add, Sub, Mul, Div, Rem,
  BitAnd, BitOr, BitXor, Shl, Shr,
  Eq, Ne, Lt, Le, Gt, Ge,
  /// Pointer arithmetic: `ptr.offset(count)`.
  Offset,
}

/// A unary operator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnOp {
  /// Bitwise/boolean negation.
  Not,
  /// Arithmetic negation.
  Neg,
}

/// The set of values a [`Terminator::SwitchValue`] can discriminate on.
/// Separated from [`Terminator::Switch`] (which always switches on an
/// enum's own discriminant) because the value domain here is open —
/// integers, `char`s, or whole string contents (§8 scenario 6).
#[derive(Clone, Debug)]
pub enum SwitchValues {
  /// Integer or `char` arms.
  Int(Vec<i128>),
  /// String-literal arms, lowered by codegen to a sorted table plus a
  /// search helper (§4.6).
  Str(Vec<Rc<[u8]>>),
}

impl SwitchValues {
  /// Number of arms (excluding the default).
  #[must_use] pub fn len(&self) -> usize {
    match self { SwitchValues::Int(v) => v.len(), SwitchValues::Str(v) => v.len() }
  }
  /// `true` if there are no explicit arms.
  #[must_use] pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// What a [`Terminator::Call`] invokes.
#[derive(Clone, Debug)]
pub enum CallTarget {
  /// An indirect call through a function-pointer-valued place.
  Value(LValue),
  /// A direct call to a named function (pre-monomorphisation, `path` may
  /// still carry generic parameters resolved against the caller's
  /// [`crate::trans_list::Params`]).
  Path(Path),
  /// A compiler intrinsic: no body exists anywhere, lowered inline by
  /// codegen (§4.6).
  Intrinsic(Symbol, Vec<TypeRef>),
}

/// The final instruction of a basic block.
#[derive(Clone, Debug)]
pub enum Terminator {
  /// Placeholder for a terminator that failed to build; never valid input
  /// to monomorphisation or codegen (an [`crate::error::Error::Bug`] if seen).
  Incomplete,
  /// Return the value in the return slot to the caller.
  Return,
  /// Re-raise an in-flight unwind to the caller (only reachable from a
  /// `Call`'s panic edge or another `Diverge`).
  Diverge,
  /// Unconditional jump.
  Goto(BlockId),
  /// Jump to the panic-handling block (`assert` failure, array
  /// out-of-bounds, etc.).
  Panic(BlockId),
  /// Two-way branch on a boolean operand.
  If(Operand, BlockId, BlockId),
  /// Switch on an enum place's own discriminant; one successor per variant
  /// in declaration order (the oracle's [`crate::repr::VariantsRepr`] says
  /// how to read it back at codegen time).
  Switch(LValue, Vec<BlockId>),
  /// Switch on an arbitrary place's runtime value against an explicit list.
  SwitchValue(LValue, SwitchValues, Vec<BlockId>, BlockId),
  /// Call a function, binding its result into `ret_lvalue` and continuing
  /// at `ret_bb` on normal return or `panic_bb` if the call unwinds.
  Call {
    /// Where to store the result.
    ret_lvalue: LValue,
    /// What to call.
    target: CallTarget,
    /// Argument operands, in order.
    args: Vec<Operand>,
    /// Successor on normal return.
    ret_bb: BlockId,
    /// Successor if the call panics/unwinds.
    panic_bb: BlockId,
  },
}

impl Terminator {
  /// All block successors, in a fixed order matching the variant's field
  /// order. Used by the enumerator's scanner-adjacent traversal and by the
  /// structured-MIR converter (§4.7) to do a generic reachability/ordering
  /// walk without a `match` at every call site.
  pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
    let mut buf: smallvec::SmallVec<[BlockId; 4]> = smallvec::SmallVec::new();
    match self {
      Terminator::Incomplete | Terminator::Return | Terminator::Diverge => {}
      Terminator::Goto(b) | Terminator::Panic(b) => buf.push(*b),
      Terminator::If(_, t, e) => { buf.push(*t); buf.push(*e); }
      Terminator::Switch(_, arms) => buf.extend(arms.iter().copied()),
      Terminator::SwitchValue(_, _, arms, default) => { buf.extend(arms.iter().copied()); buf.push(*default); }
      Terminator::Call { ret_bb, panic_bb, .. } => { buf.push(*ret_bb); buf.push(*panic_bb); }
    }
    buf.into_iter()
  }
}

/// One node of the control-flow graph.
#[derive(Clone, Debug)]
pub struct BasicBlock {
  /// Statements in execution order.
  pub statements: Vec<Statement>,
  /// The block's single terminator.
  pub terminator: Terminator,
  /// `false` for blocks a prior dataflow pass proved dead; still present in
  /// the vector (indices must stay stable) but skipped by codegen and by
  /// [`crate::structured`].
  pub reachable: bool,
}

impl BasicBlock {
  /// A block with no statements and an [`Terminator::Incomplete`] terminator,
  /// for incremental construction.
  #[must_use] pub fn incomplete() -> Self { Self { statements: Vec::new(), terminator: Terminator::Incomplete, reachable: true } }
}

/// Per-MIR-body enumeration summary (§4.1 "per-MIR cache"): the raw,
/// pre-monomorphisation paths and types the enumerator discovered the
/// first time it scanned this body. A later instantiation with a different
/// substitution re-applies [`crate::trans_list::Params::monomorphize_path`]/
/// `monomorphize_ty` to this list instead of re-walking every statement.
#[derive(Clone, Debug, Default)]
pub struct EnumCache {
  /// Every path referenced by the body (statics, consts, call targets,
  /// function-pointer addresses, intrinsic type-id arguments).
  pub paths: Vec<Path>,
  /// Every type referenced by the body, tagged with whether it was reached
  /// shallowly (behind a pointer) or would need a deep (layout) entry.
  pub types: Vec<(TypeRef, bool)>,
}

/// A MIR function body: an ordered locals table, an ordered list of
/// drop-flag initial values, and an ordered vector of basic blocks.
///
/// Invariant (post-enumeration): no body reachable for emission contains a
/// [`TypeRef::Infer`] (lifetimes aside) — checked as a `GenericAfterMono`
/// assertion by the enumerator (§4.1).
#[derive(Clone, Debug)]
pub struct Function {
  /// All locals, including the arguments (the first `arg_count` of them)
  /// and the implicit return-type-checking slot is *not* included here —
  /// the return slot is addressed via [`LValueRoot::Return`] and is typed
  /// by the function's signature, tracked separately by the caller.
  pub locals: IdxVec<LocalId, LocalDecl>,
  /// How many of the leading locals are arguments.
  pub arg_count: usize,
  /// Initial value of each drop flag, indexed by the `idx` used in
  /// [`Statement::SetDropFlag`]/[`Statement::Drop`].
  pub drop_flags: Vec<bool>,
  /// The control-flow graph.
  pub blocks: IdxVec<BlockId, BasicBlock>,
  /// The enumeration side cache (§4.1, §5: "written once per optimisation
  /// epoch and read many times, but never concurrently").
  pub cache: RefCell<Option<Rc<EnumCache>>>,
}

impl Function {
  /// An empty body with the given argument/local types, ready to have
  /// blocks pushed onto it.
  #[must_use] pub fn new(locals: IdxVec<LocalId, LocalDecl>, arg_count: usize) -> Self {
    Self { locals, arg_count, drop_flags: Vec::new(), blocks: IdxVec::new(), cache: RefCell::new(None) }
  }

  /// Invalidate the enumeration cache. Called whenever an optimisation
  /// pass rewrites this body's statements or terminators (§4.1, §5).
  pub fn invalidate_cache(&self) { *self.cache.borrow_mut() = None; }

  /// Iterate over `(id, &local)` pairs for the arguments only.
  pub fn args(&self) -> impl Iterator<Item = (LocalId, &LocalDecl)> {
    self.locals.iter_enum().take(self.arg_count)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn successors_cover_every_terminator_shape() {
    let b0 = BlockId::new(0);
    let b1 = BlockId::new(1);
    assert_eq!(Terminator::Return.successors().count(), 0);
    assert_eq!(Terminator::Goto(b0).successors().collect::<Vec<_>>(), vec![b0]);
    assert_eq!(
      Terminator::If(Operand::Constant(ConstVal::Bool(true)), b0, b1).successors().collect::<Vec<_>>(),
      vec![b0, b1]
    );
  }
}

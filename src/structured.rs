//! The structured-MIR converter (§4.7): an optional, experimental
//! alternative to the default flat/goto lowering in [`crate::codegen`].
//! Folds a function's block graph into nested `Block`/`If`/`Switch`/
//! `SwitchValue`/`Loop` nodes so that reducible control flow can be
//! emitted as C `if`/`switch`/`for(;;)` instead of labels and `goto`.
//! Irreducible fragments still bottom out in an explicit [`Node::Goto`].
//!
//! "A block is opening iff unvisited and referenced at most once; opening
//! blocks are absorbed as sub-nodes, otherwise they become explicit
//! labelled targets. A block reached a second time along the chain
//! currently being built creates a `Loop` wrapping that chain."

use std::collections::{HashMap, HashSet};

use crate::mir::{BlockId, Function, Terminator};

/// Sentinel used where the spec says "next_bb = SIZE_MAX": the node's
/// control flow does not rejoin at a single common successor, so every
/// leaf inside it must carry its own explicit jump.
pub const DIVERGENT: usize = usize::MAX;

/// One node of the folded control-flow AST.
#[derive(Debug)]
pub enum Node {
  /// A maximal straight-line run of absorbed blocks, followed by whatever
  /// comes next (another node, or a leaf).
  Block { blocks: Vec<BlockId>, next: Box<Node> },
  /// A two-way branch (`Terminator::If`, or the success/panic split of a
  /// `Terminator::Call`).
  If { cond: BlockId, then_branch: Box<Node>, else_branch: Box<Node>, next_bb: usize },
  /// An enum-discriminant switch with one arm per variant.
  Switch { discr: BlockId, arms: Vec<Node>, next_bb: usize },
  /// An arbitrary-value switch with an explicit default arm.
  SwitchValue { discr: BlockId, arms: Vec<Node>, default: Box<Node>, next_bb: usize },
  /// A detected back-edge: `body` ends by jumping back to its own entry.
  Loop { body: Box<Node> },
  /// An explicit jump to a block that is emitted (or was already emitted)
  /// as its own labelled target, rather than absorbed inline here.
  Goto(BlockId),
  /// A block whose own terminator ends the function along this path
  /// (`Return`/`Diverge`/`Panic`/`Incomplete`): nothing follows it.
  Terminal(BlockId),
}

fn reference_counts(f: &Function) -> HashMap<BlockId, u32> {
  let mut counts = HashMap::new();
  for (_, block) in f.blocks.iter_enum() {
    if !block.reachable { continue }
    for succ in block.terminator.successors() { *counts.entry(succ).or_insert(0) += 1; }
  }
  counts
}

fn is_opening(bb: BlockId, refs: &HashMap<BlockId, u32>, visited: &HashSet<BlockId>) -> bool {
  !visited.contains(&bb) && refs.get(&bb).copied().unwrap_or(0) <= 1
}

struct Builder<'a> {
  f: &'a Function,
  refs: HashMap<BlockId, u32>,
  visited: HashSet<BlockId>,
  in_chain: HashSet<BlockId>,
}

impl<'a> Builder<'a> {
  fn branch_target(&mut self, bb: BlockId) -> Node {
    if self.in_chain.contains(&bb) { return Node::Loop { body: Box::new(Node::Goto(bb)) } }
    if is_opening(bb, &self.refs, &self.visited) { self.build(bb) } else { Node::Goto(bb) }
  }

  /// Follow a node's straight-line tail to the block it would fall through
  /// to next, if it has one unambiguous such block (used to detect a
  /// common convergence point across an `If`/`Switch`'s arms).
  fn tail_target(node: &Node) -> Option<BlockId> {
    match node {
      Node::Goto(bb) => Some(*bb),
      Node::Block { next, .. } => Self::tail_target(next),
      _ => None,
    }
  }

  fn convergent_next(arms: &[Node]) -> usize {
    let mut common: Option<BlockId> = None;
    for arm in arms {
      match Self::tail_target(arm) {
        Some(bb) if common.is_none() => common = Some(bb),
        Some(bb) if common == Some(bb) => {}
        _ => return DIVERGENT,
      }
    }
    common.map_or(DIVERGENT, |bb| bb.index())
  }

  fn build_tail(&mut self, cur: BlockId) -> Node {
    match &self.f.blocks[cur].terminator {
      Terminator::Return | Terminator::Diverge | Terminator::Incomplete => Node::Terminal(cur),
      Terminator::Panic(bb) => { let target = *bb; self.branch_target(target) }
      Terminator::Goto(bb) => { let target = *bb; self.branch_target(target) }
      Terminator::If(_, t, e) => {
        let (t, e) = (*t, *e);
        let then_branch = Box::new(self.branch_target(t));
        let else_branch = Box::new(self.branch_target(e));
        let next_bb = Self::convergent_next_refs(&[&then_branch, &else_branch]);
        Node::If { cond: cur, then_branch, else_branch, next_bb }
      }
      Terminator::Switch(_, arms) => {
        let arms: Vec<Node> = arms.clone().into_iter().map(|bb| self.branch_target(bb)).collect();
        let next_bb = Self::convergent_next(&arms);
        Node::Switch { discr: cur, arms, next_bb }
      }
      Terminator::SwitchValue(_, _, arms, default) => {
        let default = *default;
        let arms: Vec<Node> = arms.clone().into_iter().map(|bb| self.branch_target(bb)).collect();
        let default = Box::new(self.branch_target(default));
        let mut all: Vec<&Node> = arms.iter().collect();
        all.push(&default);
        let next_bb = Self::convergent_next_refs(&all);
        Node::SwitchValue { discr: cur, arms, default, next_bb }
      }
      Terminator::Call { ret_bb, panic_bb, .. } => {
        let (ret_bb, panic_bb) = (*ret_bb, *panic_bb);
        let then_branch = Box::new(self.branch_target(ret_bb));
        let else_branch = Box::new(self.branch_target(panic_bb));
        let next_bb = Self::convergent_next_refs(&[&then_branch, &else_branch]);
        Node::If { cond: cur, then_branch, else_branch, next_bb }
      }
    }
  }

  fn convergent_next_refs(arms: &[&Node]) -> usize {
    let mut common: Option<BlockId> = None;
    for arm in arms {
      match Self::tail_target(arm) {
        Some(bb) if common.is_none() => common = Some(bb),
        Some(bb) if common == Some(bb) => {}
        _ => return DIVERGENT,
      }
    }
    common.map_or(DIVERGENT, |bb| bb.index())
  }

  fn build(&mut self, entry: BlockId) -> Node {
    if self.in_chain.contains(&entry) { return Node::Loop { body: Box::new(Node::Goto(entry)) } }
    self.visited.insert(entry);
    self.in_chain.insert(entry);
    let mut chain = vec![entry];
    let mut cur = entry;
    while let Terminator::Goto(next) = &self.f.blocks[cur].terminator {
      let next = *next;
      if !is_opening(next, &self.refs, &self.visited) { break }
      self.visited.insert(next);
      self.in_chain.insert(next);
      chain.push(next);
      cur = next;
    }
    let tail = self.build_tail(cur);
    for b in &chain { self.in_chain.remove(b); }
    Node::Block { blocks: chain, next: Box::new(tail) }
  }
}

/// Fold `f`'s block graph into a [`Node`] tree rooted at `entry`
/// (ordinarily [`BlockId::ENTRY`]).
#[must_use] pub fn structure(f: &Function, entry: BlockId) -> Node {
  let refs = reference_counts(f);
  let mut builder = Builder { f, refs, visited: HashSet::new(), in_chain: HashSet::new() };
  builder.build(entry)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::idx::{Idx, IdxVec};
  use crate::mir::{BasicBlock, LValue, LValueRoot, LocalDecl, LocalId, Operand, ConstVal};
  use crate::span::FileSpan;
  use crate::ty::{Primitive, TypeRef};

  fn straight_line_fn() -> Function {
    let locals = IdxVec::<LocalId, LocalDecl>::new();
    let mut f = Function::new(locals, 0);
    let mut b0 = BasicBlock::incomplete();
    b0.terminator = Terminator::Goto(BlockId::new(1));
    let mut b1 = BasicBlock::incomplete();
    b1.terminator = Terminator::Return;
    f.blocks.push(b0);
    f.blocks.push(b1);
    f
  }

  #[test]
  fn straight_line_chain_absorbs_every_block() {
    let f = straight_line_fn();
    let node = structure(&f, BlockId::ENTRY);
    match node {
      Node::Block { blocks, next } => {
        assert_eq!(blocks, vec![BlockId::new(0), BlockId::new(1)]);
        assert!(matches!(*next, Node::Terminal(_)));
      }
      other => panic!("expected a Block node, got {other:?}"),
    }
  }

  #[test]
  fn diamond_if_converges_on_shared_successor() {
    let locals = IdxVec::<LocalId, LocalDecl>::new();
    let mut f = Function::new(locals, 0);
    let mut entry = BasicBlock::incomplete();
    entry.terminator = Terminator::If(Operand::Constant(ConstVal::Bool(true)), BlockId::new(1), BlockId::new(2));
    let mut then_b = BasicBlock::incomplete();
    then_b.terminator = Terminator::Goto(BlockId::new(3));
    let mut else_b = BasicBlock::incomplete();
    else_b.terminator = Terminator::Goto(BlockId::new(3));
    let mut join = BasicBlock::incomplete();
    join.terminator = Terminator::Return;
    f.blocks.push(entry);
    f.blocks.push(then_b);
    f.blocks.push(else_b);
    f.blocks.push(join);

    let node = structure(&f, BlockId::ENTRY);
    match node {
      Node::Block { next, .. } => match *next {
        Node::If { next_bb, .. } => assert_eq!(next_bb, 3),
        other => panic!("expected If, got {other:?}"),
      },
      other => panic!("expected Block, got {other:?}"),
    }
    let _ = LValue::from_root(LValueRoot::Local(LocalId::new(0)));
    let _ = TypeRef::Primitive(Primitive::Bool);
    let _ = FileSpan::synthetic();
    let _ = Operand::Move(LValue::from_root(LValueRoot::Local(LocalId::new(0))));
  }

  #[test]
  fn back_edge_produces_loop_node() {
    let locals = IdxVec::<LocalId, LocalDecl>::new();
    let mut f = Function::new(locals, 0);
    let mut entry = BasicBlock::incomplete();
    entry.terminator = Terminator::Goto(BlockId::new(1));
    let mut header = BasicBlock::incomplete();
    header.terminator = Terminator::If(Operand::Constant(ConstVal::Bool(true)), BlockId::new(1), BlockId::new(2));
    let mut exit = BasicBlock::incomplete();
    exit.terminator = Terminator::Return;
    f.blocks.push(entry);
    f.blocks.push(header);
    f.blocks.push(exit);

    let node = structure(&f, BlockId::ENTRY);
    fn contains_loop(n: &Node) -> bool {
      match n {
        Node::Loop { .. } => true,
        Node::Block { next, .. } => contains_loop(next),
        Node::If { then_branch, else_branch, .. } => contains_loop(then_branch) || contains_loop(else_branch),
        _ => false,
      }
    }
    assert!(contains_loop(&node));
  }
}

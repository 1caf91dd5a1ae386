//! The abstract syntax tree, the function table, and the program.
//!
//! Nodes live in a single flat `Vec<Node>` arena per `Program`, addressed by
//! `NodeId`: a tagged variant plus index-based children rather than a node
//! union with many optional child pointers.

use smallvec::SmallVec;

use crate::idx::{mk_idx, Idx};
use crate::symbol::Symbol;
use crate::types::token::Span;
use crate::types::{Type, VarId};

mk_idx!(
  /// Index into [`Program::nodes`].
  NodeId
);

#[derive(Debug)]
pub enum NodeKind {
  Num(i64),
  Var(VarId),
  Add(NodeId, NodeId),
  Sub(NodeId, NodeId),
  Mul(NodeId, NodeId),
  Div(NodeId, NodeId),
  Eq(NodeId, NodeId),
  Ne(NodeId, NodeId),
  Lt(NodeId, NodeId),
  Le(NodeId, NodeId),
  Assign(NodeId, NodeId),
  Addr(NodeId),
  Deref(NodeId),
  /// Member access. `offset` is resolved by the type elaborator from the
  /// member name once the lhs's struct type is known; it is `0`
  /// (meaningless) beforehand.
  Member { lhs: NodeId, name: Symbol, offset: u64 },
  If { cond: NodeId, then: NodeId, els: Option<NodeId> },
  While { cond: NodeId, body: NodeId },
  For { init: Option<NodeId>, cond: Option<NodeId>, inc: Option<NodeId>, body: NodeId },
  Return(NodeId),
  Block(Vec<NodeId>),
  /// `({ ...; expr; })` — a parenthesized block yielding the value of its
  /// last (expression) statement.
  StmtExpr(Vec<NodeId>),
  ExprStmt(NodeId),
  Call { name: Symbol, args: SmallVec<[NodeId; 6]> },
  /// Rewritten to `Num` by the type elaborator.
  Sizeof(NodeId),
  /// Empty declaration.
  Null,
}

/// An AST node: its kind, the token it originated from (for diagnostics),
/// and — once the type elaborator has run — its result type. Statement
/// nodes (`if`/`while`/`for`/`return`/`block`/expr-stmt/null) are never
/// assigned a type.
pub struct Node<'ty> {
  pub kind: NodeKind,
  pub span: Span,
  pub ty: Option<&'ty Type<'ty>>,
}

impl<'ty> Node<'ty> {
  #[must_use] pub fn new(kind: NodeKind, span: Span) -> Self {
    Node { kind, span, ty: None }
  }
}

pub struct Function {
  pub name: Symbol,
  pub params: SmallVec<[VarId; 6]>,
  /// All locals (parameters included) in declaration order: offsets are
  /// assigned head-to-tail over this order, so the first-declared
  /// variable gets the smallest offset.
  pub locals: Vec<VarId>,
  pub body: Vec<NodeId>,
  /// Bytes subtracted from `rsp` in the prologue; `Σ size_of(local.ty)`.
  /// Assigned by [`crate::driver::assign_offsets`] after parsing.
  pub frame_size: u64,
}

pub struct Program<'ty> {
  pub vars: Vec<crate::types::Var<'ty>>,
  pub nodes: Vec<Node<'ty>>,
  pub globals: Vec<VarId>,
  pub funcs: Vec<Function>,
}

impl<'ty> Program<'ty> {
  #[must_use] pub fn node(&self, id: NodeId) -> &Node<'ty> { &self.nodes[id.into_usize()] }
  pub fn node_mut(&mut self, id: NodeId) -> &mut Node<'ty> { &mut self.nodes[id.into_usize()] }
  #[must_use] pub fn var(&self, id: VarId) -> &crate::types::Var<'ty> { &self.vars[id.into_usize()] }
  pub fn var_mut(&mut self, id: VarId) -> &mut crate::types::Var<'ty> { &mut self.vars[id.into_usize()] }

  pub fn push_node(&mut self, node: Node<'ty>) -> NodeId {
    let id = NodeId::from_usize(self.nodes.len());
    self.nodes.push(node);
    id
  }
  pub fn push_var(&mut self, var: crate::types::Var<'ty>) -> VarId {
    let id = VarId::from_usize(self.vars.len());
    self.vars.push(var);
    id
  }
}

//! Recursive-descent parser.
//!
//! A single mutable cursor over the token vector. The `is_function`
//! lookahead saves/restores `self.pos` rather than relying on a global
//! token pointer: the parser is a plain value threaded explicitly through
//! every method instead of ambient state.

use smallvec::SmallVec;

use crate::error::{Diag, Result};
use crate::symbol::{intern, Symbol};
use crate::types::ast::{Function, Node, NodeId, NodeKind, Program};
use crate::types::token::{Span, TokKind, Token};
use crate::types::{Type, Types, Var, VarId};

pub struct Parser<'ty> {
  toks: Vec<Token>,
  pos: usize,
  types: &'ty Types<'ty>,
  program: Program<'ty>,
  scope: Vec<(Symbol, VarId)>,
  locals: Vec<VarId>,
  next_data_label: u32,
}

impl<'ty> Parser<'ty> {
  #[must_use] pub fn new(toks: Vec<Token>, types: &'ty Types<'ty>) -> Self {
    Parser {
      toks,
      pos: 0,
      types,
      program: Program { vars: Vec::new(), nodes: Vec::new(), globals: Vec::new(), funcs: Vec::new() },
      scope: Vec::new(),
      locals: Vec::new(),
      next_data_label: 0,
    }
  }

  // --- token cursor -------------------------------------------------

  fn cur(&self) -> &Token { &self.toks[self.pos] }
  fn cur_span(&self) -> Span { self.cur().span }

  fn at_eof(&self) -> bool { matches!(self.cur().kind, TokKind::End) }

  fn consume(&mut self, op: &str) -> bool {
    if self.cur().is_reserved(op) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn peek(&self, op: &str) -> bool { self.cur().is_reserved(op) }

  fn expect(&mut self, op: &str) -> Result<()> {
    if self.consume(op) {
      Ok(())
    } else {
      Err(Diag::syntax(self.cur_span().start, format!("expected '{op}'")))
    }
  }

  fn consume_ident(&mut self) -> Option<Symbol> {
    if let TokKind::Ident(s) = self.cur().kind {
      self.pos += 1;
      Some(s)
    } else {
      None
    }
  }

  fn expect_ident(&mut self) -> Result<Symbol> {
    self.consume_ident().ok_or_else(|| Diag::syntax(self.cur_span().start, "expected identifier"))
  }

  fn expect_number(&mut self) -> Result<i64> {
    if let TokKind::Num(n) = self.cur().kind {
      self.pos += 1;
      Ok(n)
    } else {
      Err(Diag::syntax(self.cur_span().start, "expected a number"))
    }
  }

  // --- scope / variable table ---------------------------------------

  fn push_var(&mut self, name: Symbol, ty: &'ty Type<'ty>, is_local: bool) -> VarId {
    let var = if is_local { Var::local(name, ty) } else { Var::global(name, ty, None) };
    let id = self.program.push_var(var);
    if is_local {
      self.locals.push(id);
    } else {
      self.program.globals.push(id);
    }
    self.scope.push((name, id));
    id
  }

  fn push_global_data(&mut self, name: Symbol, ty: &'ty Type<'ty>, data: Vec<u8>) -> VarId {
    let id = self.program.push_var(Var::global(name, ty, Some(data)));
    self.program.globals.push(id);
    id
  }

  fn find_var(&self, name: Symbol) -> Option<VarId> {
    self.scope.iter().rev().find(|(n, _)| *n == name).map(|&(_, id)| id)
  }

  fn new_label(&mut self) -> Symbol {
    let s = format!(".L.data.{}", self.next_data_label);
    self.next_data_label += 1;
    intern(&s)
  }

  fn new_node(&mut self, kind: NodeKind, span: Span) -> NodeId {
    self.program.push_node(Node::new(kind, span))
  }

  // --- grammar: program = (global-var | function)* -------------------

  pub fn parse_program(mut self) -> Result<Program<'ty>> {
    while !self.at_eof() {
      if self.is_function()? {
        let f = self.function()?;
        self.program.funcs.push(f);
      } else {
        self.global_var()?;
      }
    }
    Ok(self.program)
  }

  fn is_function(&mut self) -> Result<bool> {
    let save = self.pos;
    self.basetype()?;
    let isfunc = self.consume_ident().is_some() && self.peek("(");
    self.pos = save;
    Ok(isfunc)
  }

  fn global_var(&mut self) -> Result<()> {
    let ty = self.basetype()?;
    let name = self.expect_ident()?;
    let ty = self.read_type_suffix(ty)?;
    self.expect(";")?;
    self.push_var(name, ty, false);
    Ok(())
  }

  // basetype = ("int" | "char" | struct-decl) "*"*
  fn basetype(&mut self) -> Result<&'ty Type<'ty>> {
    if !self.is_typename() {
      return Err(Diag::syntax(self.cur_span().start, "typename expected"));
    }
    let mut ty = if self.consume("char") {
      self.types.char_type()
    } else if self.consume("int") {
      self.types.int_type()
    } else {
      self.struct_decl()?
    };
    while self.consume("*") {
      ty = self.types.pointer_to(ty);
    }
    Ok(ty)
  }

  fn is_typename(&self) -> bool {
    self.peek("int") || self.peek("char") || self.peek("struct")
  }

  // struct-decl = "struct" "{" struct-member* "}"
  fn struct_decl(&mut self) -> Result<&'ty Type<'ty>> {
    self.expect("struct")?;
    self.expect("{")?;
    let mut members = Vec::new();
    while !self.consume("}") {
      members.push(self.struct_member()?);
    }
    Ok(self.types.struct_decl(members))
  }

  // struct-member = basetype ident type-suffix ";"
  fn struct_member(&mut self) -> Result<(Symbol, &'ty Type<'ty>)> {
    let ty = self.basetype()?;
    let name = self.expect_ident()?;
    let ty = self.read_type_suffix(ty)?;
    self.expect(";")?;
    Ok((name, ty))
  }

  // type-suffix = ("[" num "]")*
  fn read_type_suffix(&mut self, base: &'ty Type<'ty>) -> Result<&'ty Type<'ty>> {
    if !self.consume("[") {
      return Ok(base);
    }
    let len = self.expect_number()?;
    self.expect("]")?;
    let base = self.read_type_suffix(base)?;
    Ok(self.types.array_of(base, u64::try_from(len).unwrap_or(0)))
  }

  fn read_func_param(&mut self) -> Result<VarId> {
    let ty = self.basetype()?;
    let name = self.expect_ident()?;
    let ty = self.read_type_suffix(ty)?;
    Ok(self.push_var(name, ty, true))
  }

  fn read_func_params(&mut self) -> Result<SmallVec<[VarId; 6]>> {
    let span = self.cur_span();
    let mut params = SmallVec::new();
    if self.consume(")") {
      return Ok(params);
    }
    params.push(self.read_func_param()?);
    while !self.consume(")") {
      self.expect(",")?;
      params.push(self.read_func_param()?);
    }
    if params.len() > 6 {
      return Err(Diag::syntax(span.start, "more than 6 parameters is not supported"));
    }
    Ok(params)
  }

  // function = basetype ident "(" params? ")" "{" stmt* "}"
  fn function(&mut self) -> Result<Function> {
    self.locals = Vec::new();
    self.basetype()?; // return type is not modeled: no function prototypes
    let name = self.expect_ident()?;
    self.expect("(")?;
    let params = self.read_func_params()?;
    self.expect("{")?;

    let mut body = Vec::new();
    while !self.consume("}") {
      body.push(self.stmt()?);
    }

    Ok(Function { name, params, locals: std::mem::take(&mut self.locals), body, frame_size: 0 })
  }

  // declaration = basetype ident type-suffix? ("=" expr)? ";"
  fn declaration(&mut self) -> Result<NodeId> {
    let span = self.cur_span();
    let ty = self.basetype()?;
    let name = self.expect_ident()?;
    let ty = self.read_type_suffix(ty)?;
    let var = self.push_var(name, ty, true);

    if self.consume(";") {
      return Ok(self.new_node(NodeKind::Null, span));
    }

    self.expect("=")?;
    let lhs = self.new_node(NodeKind::Var(var), span);
    let rhs = self.expr()?;
    self.expect(";")?;
    let assign = self.new_node(NodeKind::Assign(lhs, rhs), span);
    Ok(self.new_node(NodeKind::ExprStmt(assign), span))
  }

  // stmt = "{" stmt* "}" | "return" expr ";" | "if" (...) | "while" (...)
  //      | "for" (...) | declaration | expr ";"
  fn stmt(&mut self) -> Result<NodeId> {
    let span = self.cur_span();

    if self.consume("{") {
      let saved_scope = self.scope.len();
      let mut body = Vec::new();
      while !self.consume("}") {
        body.push(self.stmt()?);
      }
      self.scope.truncate(saved_scope);
      return Ok(self.new_node(NodeKind::Block(body), span));
    }

    if self.consume("return") {
      let e = self.expr()?;
      self.expect(";")?;
      return Ok(self.new_node(NodeKind::Return(e), span));
    }

    if self.consume("if") {
      self.expect("(")?;
      let cond = self.expr()?;
      self.expect(")")?;
      let then = self.stmt()?;
      let els = if self.consume("else") { Some(self.stmt()?) } else { None };
      return Ok(self.new_node(NodeKind::If { cond, then, els }, span));
    }

    if self.consume("while") {
      self.expect("(")?;
      let cond = self.expr()?;
      self.expect(")")?;
      let body = self.stmt()?;
      return Ok(self.new_node(NodeKind::While { cond, body }, span));
    }

    if self.consume("for") {
      self.expect("(")?;
      let init = if self.consume(";") { None } else {
        let e = self.read_expr_stmt()?;
        self.expect(";")?;
        Some(e)
      };
      let cond = if self.consume(";") { None } else {
        let e = self.expr()?;
        self.expect(";")?;
        Some(e)
      };
      let inc = if self.consume(")") { None } else {
        let e = self.read_expr_stmt()?;
        self.expect(")")?;
        Some(e)
      };
      let body = self.stmt()?;
      return Ok(self.new_node(NodeKind::For { init, cond, inc, body }, span));
    }

    if self.is_typename() {
      return self.declaration();
    }

    let e = self.read_expr_stmt()?;
    self.expect(";")?;
    Ok(e)
  }

  fn read_expr_stmt(&mut self) -> Result<NodeId> {
    let span = self.cur_span();
    let e = self.expr()?;
    Ok(self.new_node(NodeKind::ExprStmt(e), span))
  }

  fn expr(&mut self) -> Result<NodeId> { self.assign() }

  // assign = equality ("=" assign)?        -- right-associative
  fn assign(&mut self) -> Result<NodeId> {
    let node = self.equality()?;
    if self.peek("=") {
      let span = self.cur_span();
      self.pos += 1;
      let rhs = self.assign()?;
      return Ok(self.new_node(NodeKind::Assign(node, rhs), span));
    }
    Ok(node)
  }

  fn equality(&mut self) -> Result<NodeId> {
    let mut node = self.relational()?;
    loop {
      let span = self.cur_span();
      if self.consume("==") {
        let rhs = self.relational()?;
        node = self.new_node(NodeKind::Eq(node, rhs), span);
      } else if self.consume("!=") {
        let rhs = self.relational()?;
        node = self.new_node(NodeKind::Ne(node, rhs), span);
      } else {
        return Ok(node);
      }
    }
  }

  fn relational(&mut self) -> Result<NodeId> {
    let mut node = self.add()?;
    loop {
      let span = self.cur_span();
      if self.consume("<") {
        let rhs = self.add()?;
        node = self.new_node(NodeKind::Lt(node, rhs), span);
      } else if self.consume("<=") {
        let rhs = self.add()?;
        node = self.new_node(NodeKind::Le(node, rhs), span);
      } else if self.consume(">") {
        let rhs = self.add()?;
        node = self.new_node(NodeKind::Lt(rhs, node), span);
      } else if self.consume(">=") {
        let rhs = self.add()?;
        node = self.new_node(NodeKind::Le(rhs, node), span);
      } else {
        return Ok(node);
      }
    }
  }

  fn add(&mut self) -> Result<NodeId> {
    let mut node = self.mul()?;
    loop {
      let span = self.cur_span();
      if self.consume("+") {
        let rhs = self.mul()?;
        node = self.new_node(NodeKind::Add(node, rhs), span);
      } else if self.consume("-") {
        let rhs = self.mul()?;
        node = self.new_node(NodeKind::Sub(node, rhs), span);
      } else {
        return Ok(node);
      }
    }
  }

  fn mul(&mut self) -> Result<NodeId> {
    let mut node = self.unary()?;
    loop {
      let span = self.cur_span();
      if self.consume("*") {
        let rhs = self.unary()?;
        node = self.new_node(NodeKind::Mul(node, rhs), span);
      } else if self.consume("/") {
        let rhs = self.unary()?;
        node = self.new_node(NodeKind::Div(node, rhs), span);
      } else {
        return Ok(node);
      }
    }
  }

  // unary = ("+"|"-")? unary | ("*"|"&") unary | postfix
  fn unary(&mut self) -> Result<NodeId> {
    let span = self.cur_span();
    if self.consume("+") {
      return self.unary();
    }
    if self.consume("-") {
      let zero = self.new_node(NodeKind::Num(0), span);
      let rhs = self.unary()?;
      return Ok(self.new_node(NodeKind::Sub(zero, rhs), span));
    }
    if self.consume("*") {
      let inner = self.unary()?;
      return Ok(self.new_node(NodeKind::Deref(inner), span));
    }
    if self.consume("&") {
      let inner = self.unary()?;
      return Ok(self.new_node(NodeKind::Addr(inner), span));
    }
    self.postfix()
  }

  // postfix = primary ( "[" expr "]" | "." ident )*
  fn postfix(&mut self) -> Result<NodeId> {
    let mut node = self.primary()?;
    loop {
      let span = self.cur_span();
      if self.consume("[") {
        let idx = self.expr()?;
        self.expect("]")?;
        let sum = self.new_node(NodeKind::Add(node, idx), span);
        node = self.new_node(NodeKind::Deref(sum), span);
        continue;
      }
      if self.consume(".") {
        let name = self.expect_ident()?;
        node = self.new_node(NodeKind::Member { lhs: node, name, offset: 0 }, span);
        continue;
      }
      return Ok(node);
    }
  }

  fn func_args(&mut self, span: Span) -> Result<SmallVec<[NodeId; 6]>> {
    let mut args = SmallVec::new();
    if self.consume(")") {
      return Ok(args);
    }
    args.push(self.assign()?);
    while self.consume(",") {
      args.push(self.assign()?);
    }
    self.expect(")")?;
    if args.len() > 6 {
      return Err(Diag::syntax(span.start, "more than 6 arguments is not supported"));
    }
    Ok(args)
  }

  /// `"(" "{" stmt stmt* "}" ")"` — the opening `"(" "{"` has already been
  /// consumed by `primary`.
  fn stmt_expr(&mut self, span: Span) -> Result<NodeId> {
    let saved_scope = self.scope.len();
    let mut body = vec![self.stmt()?];
    while !self.consume("}") {
      body.push(self.stmt()?);
    }
    self.expect(")")?;
    self.scope.truncate(saved_scope);

    let last = *body.last().expect("stmt_expr always has at least one statement");
    match self.program.node(last).kind {
      NodeKind::ExprStmt(inner) => {
        let len = body.len();
        body[len - 1] = inner;
      }
      _ => return Err(Diag::syntax(span.start, "statement expression returning void is not supported")),
    }

    Ok(self.new_node(NodeKind::StmtExpr(body), span))
  }

  // primary = "(" "{" stmt* "}" ")" | "(" expr ")" | "sizeof" unary
  //         | ident "(" func-args? ")" | ident | num | string-literal
  fn primary(&mut self) -> Result<NodeId> {
    let span = self.cur_span();

    if self.consume("(") {
      if self.consume("{") {
        return self.stmt_expr(span);
      }
      let node = self.expr()?;
      self.expect(")")?;
      return Ok(node);
    }

    if let Some(name) = self.consume_ident() {
      if self.consume("(") {
        let args = self.func_args(span)?;
        return Ok(self.new_node(NodeKind::Call { name, args }, span));
      }
      let var = self.find_var(name).ok_or_else(|| Diag::semantic(span.start, "undefined variable"))?;
      return Ok(self.new_node(NodeKind::Var(var), span));
    }

    if self.consume("sizeof") {
      let inner = self.unary()?;
      return Ok(self.new_node(NodeKind::Sizeof(inner), span));
    }

    // All errors are fatal, so there is no need to backtrack on the failure
    // path below — taking ownership of the token's payload here is safe
    // even though we don't put it back.
    match std::mem::replace(&mut self.toks[self.pos].kind, TokKind::End) {
      TokKind::Num(n) => {
        self.pos += 1;
        Ok(self.new_node(NodeKind::Num(n), span))
      }
      TokKind::Str { bytes, cont_len } => {
        self.pos += 1;
        let ty = self.types.array_of(self.types.char_type(), u64::from(cont_len));
        let label = self.new_label();
        let var = self.push_global_data(label, ty, bytes);
        Ok(self.new_node(NodeKind::Var(var), span))
      }
      _ => Err(Diag::syntax(span.start, "expected expression")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexer::lex;

  fn parse_src<'ty>(src: &str, types: &'ty Types<'ty>) -> Result<Program<'ty>> {
    let mut buf = src.as_bytes().to_vec();
    buf.push(0);
    let toks = lex(&buf).unwrap();
    Parser::new(toks, types).parse_program()
  }

  #[test]
  fn rejects_more_than_six_parameters() {
    let arena = typed_arena::Arena::new();
    let types = Types::new(&arena);
    let src = "int f(int a, int b, int c, int d, int e, int f, int g) { return a; }";
    assert!(matches!(parse_src(src, &types), Err(Diag::Syntax { .. })));
  }

  #[test]
  fn rejects_more_than_six_call_arguments() {
    let arena = typed_arena::Arena::new();
    let types = Types::new(&arena);
    let src = "int main() { return f(1,2,3,4,5,6,7); }";
    assert!(matches!(parse_src(src, &types), Err(Diag::Syntax { .. })));
  }

  #[test]
  fn block_scope_is_restored_on_exit() {
    let arena = typed_arena::Arena::new();
    let types = Types::new(&arena);
    let src = "int main() { { int a; a = 1; } return a; }";
    assert!(matches!(parse_src(src, &types), Err(Diag::Semantic { .. })));
  }

  #[test]
  fn string_literal_hoists_to_anonymous_global() {
    let arena = typed_arena::Arena::new();
    let types = Types::new(&arena);
    let program = parse_src(r#"int main() { char *s; s = "hi"; return 0; }"#, &types).unwrap();
    assert_eq!(program.globals.len(), 1);
    let var = program.var(program.globals[0]);
    assert_eq!(var.name.as_str(), ".L.data.0");
    assert_eq!(var.data.as_deref(), Some(b"hi\0".as_slice()));
  }

  #[test]
  fn x_subscript_desugars_to_deref_of_add() {
    let arena = typed_arena::Arena::new();
    let types = Types::new(&arena);
    let program = parse_src("int main() { int a[3]; return a[1]; }", &types).unwrap();
    let ret = *program.funcs[0].body.last().unwrap();
    let NodeKind::Return(inner) = program.node(ret).kind else { panic!("expected return") };
    let NodeKind::Deref(sum) = program.node(inner).kind else { panic!("expected deref") };
    assert!(matches!(program.node(sum).kind, NodeKind::Add(..)));
  }
}

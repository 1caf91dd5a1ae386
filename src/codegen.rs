//! The code generator.
//!
//! Walks the elaborated tree emitting a stack-machine translation: every
//! expression, once evaluated, leaves exactly one 8-byte value pushed;
//! statements leave the runtime stack net-unchanged.

use std::io::Write;

use crate::error::{Diag, Result};
use crate::symbol::Symbol;
use crate::types::ast::{Function, NodeId, NodeKind, Program};
use crate::types::{is_array, size_of, Type};

const ARGREG64: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
const ARGREG8: [&str; 6] = ["dil", "sil", "dl", "cl", "r8b", "r9b"];

/// Emit the `.data` section: one label per global, followed by its
/// zero-fill or byte payload.
pub fn emit_data(program: &Program<'_>, out: &mut impl Write) -> Result<()> {
  log::debug!("emitting .data ({} globals)", program.globals.len());
  writeln!(out, ".data")?;
  for &id in &program.globals {
    let var = program.var(id);
    writeln!(out, "{}:", var.name)?;
    match &var.data {
      None => writeln!(out, "  .zero {}", size_of(var.ty))?,
      Some(bytes) => {
        for &b in bytes {
          writeln!(out, "  .byte {b}")?;
        }
      }
    }
  }
  Ok(())
}

/// Emit the `.text` section: one `.global`-exported label and body per
/// function.
pub fn emit_text(program: &Program<'_>, out: &mut impl Write) -> Result<()> {
  log::debug!("emitting .text ({} functions)", program.funcs.len());
  writeln!(out, ".text")?;
  // A single counter shared across every function's Codegen, matching
  // codegen.c's file-global `label_seq` — label indices must stay unique
  // across the whole `.s` file, not just within one function.
  let mut label_seq = 0u32;
  for func in &program.funcs {
    let mut gen = Codegen { program, out, label_seq: &mut label_seq, funcname: func.name };
    gen.emit_function(func)?;
  }
  Ok(())
}

struct Codegen<'p, 'ty, W> {
  program: &'p Program<'ty>,
  out: &'p mut W,
  label_seq: &'p mut u32,
  funcname: Symbol,
}

impl<'ty, W: Write> Codegen<'_, 'ty, W> {
  fn next_seq(&mut self) -> u32 {
    let seq = *self.label_seq;
    *self.label_seq += 1;
    seq
  }

  fn emit_function(&mut self, func: &Function) -> Result<()> {
    writeln!(self.out, ".global {}", func.name)?;
    writeln!(self.out, "{}:", func.name)?;

    // prologue
    writeln!(self.out, "    push rbp")?;
    writeln!(self.out, "    mov rbp, rsp")?;
    writeln!(self.out, "    sub rsp, {}", func.frame_size)?;

    for (i, &param) in func.params.iter().enumerate() {
      let var = self.program.var(param);
      let reg = if size_of(var.ty) == 1 { ARGREG8[i] } else { ARGREG64[i] };
      writeln!(self.out, "    mov [rbp-{}], {reg}", var.offset)?;
    }

    for &id in &func.body {
      self.gen(id)?;
    }

    // epilogue — ND_RETURN jumps here.
    writeln!(self.out, ".Lreturn.{}:", func.name)?;
    writeln!(self.out, "    mov rsp, rbp")?;
    writeln!(self.out, "    pop rbp")?;
    writeln!(self.out, "    ret")?;
    Ok(())
  }

  /// Push the *address* of an lvalue node.
  fn gen_addr(&mut self, id: NodeId) -> Result<()> {
    let node = self.program.node(id);
    match node.kind {
      NodeKind::Var(v) => {
        let var = self.program.var(v);
        if var.is_local {
          writeln!(self.out, "    mov rax, rbp")?;
          writeln!(self.out, "    sub rax, {}", var.offset)?;
          writeln!(self.out, "    push rax")?;
        } else {
          writeln!(self.out, "    push offset {}", var.name)?;
        }
        Ok(())
      }
      NodeKind::Deref(lhs) => self.gen(lhs),
      NodeKind::Member { lhs, offset, .. } => {
        self.gen_addr(lhs)?;
        writeln!(self.out, "    pop rax")?;
        writeln!(self.out, "    add rax, {offset}")?;
        writeln!(self.out, "    push rax")?;
        Ok(())
      }
      _ => Err(Diag::semantic(node.span.start, "not a variable")),
    }
  }

  /// `gen_addr`, but rejecting array-typed lvalues — arrays decay to
  /// their address and can never be assignment targets.
  fn gen_lval(&mut self, id: NodeId) -> Result<()> {
    let node = self.program.node(id);
    if let Some(ty) = node.ty {
      if is_array(ty) {
        return Err(Diag::semantic(node.span.start, "not an lvalue"));
      }
    }
    self.gen_addr(id)
  }

  fn load(&mut self, ty: &Type<'_>) -> Result<()> {
    writeln!(self.out, "    pop rax")?;
    if size_of(ty) == 1 {
      writeln!(self.out, "    movsx rax, byte ptr [rax]")?;
    } else {
      writeln!(self.out, "    mov rax, [rax]")?;
    }
    writeln!(self.out, "    push rax")?;
    Ok(())
  }

  fn store(&mut self, ty: &Type<'_>) -> Result<()> {
    writeln!(self.out, "    pop rdi")?;
    writeln!(self.out, "    pop rax")?;
    if size_of(ty) == 1 {
      writeln!(self.out, "    mov [rax], dil")?;
    } else {
      writeln!(self.out, "    mov [rax], rdi")?;
    }
    writeln!(self.out, "    push rdi")?;
    Ok(())
  }

  fn ty_of(&self, id: NodeId) -> Result<&'ty Type<'ty>> {
    self.program.node(id).ty.ok_or_else(|| Diag::internal("untyped expression reached codegen"))
  }

  #[allow(clippy::too_many_lines)]
  fn gen(&mut self, id: NodeId) -> Result<()> {
    let node = self.program.node(id);

    match node.kind {
      NodeKind::Null => Ok(()),

      NodeKind::If { cond, then, els } => {
        let seq = self.next_seq();
        self.gen(cond)?;
        writeln!(self.out, "    pop rax")?;
        writeln!(self.out, "    cmp rax, 0")?;
        if let Some(els) = els {
          writeln!(self.out, "    je .Lelse{seq}")?;
          self.gen(then)?;
          writeln!(self.out, "    jmp .Lend{seq}")?;
          writeln!(self.out, ".Lelse{seq}:")?;
          self.gen(els)?;
          writeln!(self.out, ".Lend{seq}:")?;
        } else {
          writeln!(self.out, "    je .Lend{seq}")?;
          self.gen(then)?;
          writeln!(self.out, ".Lend{seq}:")?;
        }
        Ok(())
      }

      NodeKind::While { cond, body } => {
        let seq = self.next_seq();
        writeln!(self.out, ".Lbegin{seq}:")?;
        self.gen(cond)?;
        writeln!(self.out, "    pop rax")?;
        writeln!(self.out, "    cmp rax, 0")?;
        writeln!(self.out, "    je .Lend{seq}")?;
        self.gen(body)?;
        writeln!(self.out, "    jmp .Lbegin{seq}")?;
        writeln!(self.out, ".Lend{seq}:")?;
        Ok(())
      }

      NodeKind::For { init, cond, inc, body } => {
        let seq = self.next_seq();
        if let Some(init) = init {
          self.gen(init)?;
        }
        writeln!(self.out, ".Lbegin{seq}:")?;
        if let Some(cond) = cond {
          self.gen(cond)?;
          writeln!(self.out, "    pop rax")?;
          writeln!(self.out, "    cmp rax, 0")?;
          writeln!(self.out, "    je .Lend{seq}")?;
        }
        self.gen(body)?;
        if let Some(inc) = inc {
          self.gen(inc)?;
        }
        writeln!(self.out, "    jmp .Lbegin{seq}")?;
        writeln!(self.out, ".Lend{seq}:")?;
        Ok(())
      }

      NodeKind::Call { name, ref args } => {
        let nargs = args.len();
        for &arg in args {
          self.gen(arg)?;
        }
        for i in (0..nargs).rev() {
          writeln!(self.out, "    pop {}", ARGREG64[i])?;
        }

        // Dynamic 16-byte stack alignment around `call`.
        let seq = self.next_seq();
        writeln!(self.out, "    mov rax, rsp")?;
        writeln!(self.out, "    and rax, 15")?;
        writeln!(self.out, "    jnz .Lcall{seq}")?;
        writeln!(self.out, "    mov rax, 0")?;
        writeln!(self.out, "    call {name}")?;
        writeln!(self.out, "    jmp .Lend{seq}")?;
        writeln!(self.out, ".Lcall{seq}:")?;
        writeln!(self.out, "    sub rsp, 8")?;
        writeln!(self.out, "    mov rax, 0")?;
        writeln!(self.out, "    call {name}")?;
        writeln!(self.out, "    add rsp, 8")?;
        writeln!(self.out, ".Lend{seq}:")?;
        writeln!(self.out, "    push rax")?;
        Ok(())
      }

      NodeKind::ExprStmt(inner) => {
        self.gen(inner)?;
        writeln!(self.out, "    add rsp, 8")?;
        Ok(())
      }

      NodeKind::Block(ref body) | NodeKind::StmtExpr(ref body) => {
        for &stmt in body {
          self.gen(stmt)?;
        }
        Ok(())
      }

      NodeKind::Return(inner) => {
        self.gen(inner)?;
        writeln!(self.out, "    pop rax")?;
        writeln!(self.out, "    jmp .Lreturn.{}", self.funcname)?;
        Ok(())
      }

      NodeKind::Addr(lhs) => self.gen_addr(lhs),

      NodeKind::Deref(lhs) => {
        self.gen(lhs)?;
        let ty = self.ty_of(id)?;
        if !is_array(ty) {
          self.load(ty)?;
        }
        Ok(())
      }

      NodeKind::Num(n) => {
        writeln!(self.out, "    push {n}")?;
        Ok(())
      }

      NodeKind::Var(_) | NodeKind::Member { .. } => {
        self.gen_addr(id)?;
        let ty = self.ty_of(id)?;
        if !is_array(ty) {
          self.load(ty)?;
        }
        Ok(())
      }

      NodeKind::Assign(lhs, rhs) => {
        self.gen_lval(lhs)?;
        self.gen(rhs)?;
        let ty = self.ty_of(lhs)?;
        self.store(ty)?;
        Ok(())
      }

      NodeKind::Sizeof(_) => Err(Diag::internal("sizeof survived type elaboration")),

      NodeKind::Add(lhs, rhs)
      | NodeKind::Sub(lhs, rhs)
      | NodeKind::Mul(lhs, rhs)
      | NodeKind::Div(lhs, rhs)
      | NodeKind::Eq(lhs, rhs)
      | NodeKind::Ne(lhs, rhs)
      | NodeKind::Lt(lhs, rhs)
      | NodeKind::Le(lhs, rhs) => self.gen_binary(&node.kind, lhs, rhs),
    }
  }

  fn gen_binary(&mut self, kind: &NodeKind, lhs: NodeId, rhs: NodeId) -> Result<()> {
    self.gen(lhs)?;
    self.gen(rhs)?;
    writeln!(self.out, "    pop rdi")?;
    writeln!(self.out, "    pop rax")?;

    match *kind {
      NodeKind::Add(..) | NodeKind::Sub(..) => {
        let ty = self.ty_of(lhs)?;
        if let Some(base) = crate::types::base_of(ty) {
          writeln!(self.out, "    imul rdi, {}", size_of(base))?;
        }
        if matches!(kind, NodeKind::Add(..)) {
          writeln!(self.out, "    add rax, rdi")?;
        } else {
          writeln!(self.out, "    sub rax, rdi")?;
        }
      }
      NodeKind::Mul(..) => writeln!(self.out, "    imul rax, rdi")?,
      NodeKind::Div(..) => {
        writeln!(self.out, "    cqo")?;
        writeln!(self.out, "    idiv rdi")?;
      }
      NodeKind::Eq(..) | NodeKind::Ne(..) | NodeKind::Lt(..) | NodeKind::Le(..) => {
        writeln!(self.out, "    cmp rax, rdi")?;
        let set = match *kind {
          NodeKind::Eq(..) => "sete",
          NodeKind::Ne(..) => "setne",
          NodeKind::Lt(..) => "setl",
          NodeKind::Le(..) => "setle",
          _ => unreachable!(),
        };
        writeln!(self.out, "    {set} al")?;
        writeln!(self.out, "    movzb rax, al")?;
      }
      _ => return Err(Diag::internal("invalid node reached gen_binary")),
    }

    writeln!(self.out, "    push rax")?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::driver::compile;

  #[test]
  fn emits_intel_syntax_and_sections() {
    let asm = compile("t.c", b"int main() { return 42; }\0").unwrap();
    assert!(asm.starts_with(".intel_syntax noprefix\n"));
    assert!(asm.contains(".data\n"));
    assert!(asm.contains(".text\n"));
    assert!(asm.contains(".global main"));
    assert!(asm.contains("push 42"));
  }

  #[test]
  fn call_alignment_dance_present() {
    let asm =
      compile("t.c", b"int add(int a,int b){return a+b;} int main(){return add(2,3);}\0").unwrap();
    assert!(asm.contains("and rax, 15"));
    assert!(asm.contains("jnz .Lcall0"));
  }

  #[test]
  fn label_counter_is_shared_across_functions() {
    // Each of `f` and `main` emits one call, so each emits one `.Lcall<n>`/
    // `.Lend<n>` pair; with a single file-global counter they must get
    // distinct indices (0 and 1) rather than both emitting `.Lcall0`, which
    // `as` would reject as a duplicate label.
    let asm = compile("t.c", b"int g(){return 1;} int f(){return g();} int main(){return f();}\0")
      .unwrap();
    assert_eq!(asm.matches(".Lcall0:").count(), 1);
    assert_eq!(asm.matches(".Lcall1:").count(), 1);
  }

  #[test]
  fn unary_minus_and_zero_sub_compile_identically() {
    let neg = compile("t.c", b"int main() { int x; x = 3; return -x; }\0").unwrap();
    let sub = compile("t.c", b"int main() { int x; x = 3; return 0 - x; }\0").unwrap();
    assert_eq!(neg, sub);
  }

  #[test]
  fn array_subscript_and_pointer_deref_compile_identically() {
    let sub = compile("t.c", b"int main() { int a[3]; return a[1]; }\0").unwrap();
    let deref = compile("t.c", b"int main() { int a[3]; return *(a+1); }\0").unwrap();
    assert_eq!(sub, deref);
  }

  #[test]
  fn string_literal_global_is_nul_terminated_byte_sequence() {
    let asm = compile("t.c", b"int main() { char *s; s = \"hi\"; return 0; }\0").unwrap();
    assert!(asm.contains(".L.data.0:"));
    assert!(asm.contains(".byte 104"));
    assert!(asm.contains(".byte 105"));
    assert!(asm.contains(".byte 0"));
  }

  #[test]
  fn zero_initialized_global_emits_zero_directive() {
    let asm = compile("t.c", b"int g; int main() { return g; }\0").unwrap();
    assert!(asm.contains("g:\n  .zero 8"));
  }

  #[test]
  fn char_parameter_uses_one_byte_register_alias() {
    let asm = compile("t.c", b"int f(char c) { return c; } int main() { return f(3); }\0").unwrap();
    assert!(asm.contains("mov [rbp-1], dil"));
  }
}

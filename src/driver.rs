//! The driver: reads the input file, runs the four passes in order, and
//! assigns frame-local offsets in between parsing and codegen.
//!
//! Locals are appended to a `Vec` in declaration order (see
//! `parser::Parser::push_var`), so the natural head-to-tail walk below
//! gives the first-declared variable the smallest offset.

use std::io::Write;
use std::path::Path;

use itertools::Itertools as _;

use crate::error::{Diag, Result};
use crate::types::ast::Program;
use crate::types::{size_of, Types};

/// Read the input file into a buffer, adding a trailing newline if absent
/// and terminating it with a NUL byte.
pub fn read_source(path: &Path) -> Result<Vec<u8>> {
  let mut buf = std::fs::read(path).map_err(|e| Diag::Io(format!("{}: {e}", path.display())))?;
  if buf.last() != Some(&b'\n') {
    buf.push(b'\n');
  }
  buf.push(0);
  Ok(buf)
}

/// Run the lexer, parser, type elaborator, offset assignment, and code
/// generator in order, returning the emitted `.s` text.
pub fn compile(filename: &str, src: &[u8]) -> Result<String> {
  let arena = typed_arena::Arena::new();
  let types = Types::new(&arena);

  log::trace!("compiling {filename} ({} bytes)", src.len());
  let toks = crate::lexer::lex(src)?;
  log::trace!("lexed {} tokens", toks.len());

  let mut program = crate::parser::Parser::new(toks, &types).parse_program()?;
  log::trace!(
    "parsed functions: [{}], {} globals",
    program.funcs.iter().map(|f| f.name.to_string()).join(", "),
    program.globals.len()
  );

  crate::elab::elaborate(&mut program, &types)?;
  log::trace!("elaborated");

  assign_offsets(&mut program);

  let mut out = Vec::new();
  writeln!(out, ".intel_syntax noprefix")?;
  crate::codegen::emit_data(&program, &mut out)?;
  crate::codegen::emit_text(&program, &mut out)?;
  log::trace!("emitted {} bytes of assembly", out.len());

  Ok(String::from_utf8(out).expect("emitted assembly is always ASCII"))
}

pub fn assign_offsets(program: &mut Program<'_>) {
  for fi in 0..program.funcs.len() {
    let locals = program.funcs[fi].locals.clone();
    let mut offset = 0u64;
    for &var_id in &locals {
      offset += size_of(program.var(var_id).ty);
      program.var_mut(var_id).offset = offset;
    }
    program.funcs[fi].frame_size = offset;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexer::lex;
  use crate::parser::Parser;
  use crate::types::Types;

  #[test]
  fn first_declared_local_gets_the_smallest_offset() {
    let arena = typed_arena::Arena::new();
    let types = Types::new(&arena);
    let mut buf = b"int main() { int a; char b; int c; return 0; }".to_vec();
    buf.push(0);
    let toks = lex(&buf).unwrap();
    let mut program = Parser::new(toks, &types).parse_program().unwrap();
    assign_offsets(&mut program);

    let locals = &program.funcs[0].locals;
    let offsets: Vec<u64> = locals.iter().map(|&id| program.var(id).offset).collect();
    // a: offset 8 (int, declared first -> smallest offset)
    // b: offset 9 (char, packed right after)
    // c: offset 17 (int)
    assert_eq!(offsets, vec![8, 9, 17]);
    assert_eq!(program.funcs[0].frame_size, 17);
  }

  #[test]
  fn params_count_as_locals_declared_first() {
    let arena = typed_arena::Arena::new();
    let types = Types::new(&arena);
    let mut buf = b"int add(int a, int b) { int c; return a + b + c; }".to_vec();
    buf.push(0);
    let toks = lex(&buf).unwrap();
    let mut program = Parser::new(toks, &types).parse_program().unwrap();
    assign_offsets(&mut program);

    assert_eq!(program.funcs[0].locals.len(), 3);
    assert_eq!(program.funcs[0].frame_size, 24);
  }

  #[test]
  fn read_source_appends_missing_trailing_newline_and_nul() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "int main() {{ return 0; }}").unwrap(); // no trailing newline
    let buf = read_source(f.path()).unwrap();
    assert_eq!(buf.last(), Some(&0));
    assert_eq!(buf[buf.len() - 2], b'\n');
  }

  #[test]
  fn compile_end_to_end_from_a_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "int main() {{ return 42; }}\n").unwrap();
    let src = read_source(f.path()).unwrap();
    let asm = compile("t.c", &src).unwrap();
    assert!(asm.contains(".global main"));
    assert!(asm.contains("push 42"));
  }

  #[test]
  fn read_source_reports_io_error_for_missing_file() {
    let result = read_source(Path::new("/no/such/file/here.c"));
    assert!(matches!(result, Err(Diag::Io(_))));
  }
}

//! Global identifier interning.
//!
//! Identifiers and function names are interned once and compared/hashed as
//! a `u32` rather than repeatedly as `&str`.
//!
//! Symbols live for the process lifetime — the whole arena is released at
//! process exit — so the backing text is leaked rather than
//! reference-counted.

use hashbrown::HashMap;
use std::sync::{Mutex, OnceLock};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

impl Symbol {
  #[must_use] pub fn as_str(self) -> &'static str {
    interner().lock().unwrap_or_else(std::sync::PoisonError::into_inner).strs[self.0 as usize]
  }
}

impl std::fmt::Debug for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}", self.as_str())
  }
}

impl std::fmt::Display for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Default)]
struct Interner {
  map: HashMap<&'static str, u32>,
  strs: Vec<&'static str>,
}

fn interner() -> &'static Mutex<Interner> {
  static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();
  INTERNER.get_or_init(|| Mutex::new(Interner::default()))
}

/// Intern `s`, returning a `Symbol` that compares/hashes as `s` would.
#[must_use] pub fn intern(s: &str) -> Symbol {
  let mut interner = interner().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
  if let Some(&id) = interner.map.get(s) {
    return Symbol(id);
  }
  let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
  let id = u32::try_from(interner.strs.len()).expect("too many interned symbols");
  interner.strs.push(leaked);
  interner.map.insert(leaked, id);
  Symbol(id)
}

#[cfg(test)]
mod tests {
  use super::intern;

  #[test]
  fn interns_equal_strings_to_equal_symbols() {
    assert_eq!(intern("foo"), intern("foo"));
    assert_ne!(intern("foo"), intern("bar"));
  }

  #[test]
  fn round_trips_text() {
    let s = intern("hello_world_42");
    assert_eq!(s.as_str(), "hello_world_42");
  }
}

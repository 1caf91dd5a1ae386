//! Newtype index pattern for the node/variable arenas (see `types::ast`,
//! `types::ty`): a `u32`-backed handle that's `Copy`, compares by value,
//! and can't be confused with a raw array index.

pub trait Idx: Copy + Eq + std::hash::Hash {
  fn from_usize(n: usize) -> Self;
  fn into_usize(self) -> usize;
}

macro_rules! mk_idx {
  ($(#[$attr:meta])* $name:ident) => {
    $(#[$attr])*
    #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
    pub struct $name(u32);

    impl crate::idx::Idx for $name {
      #[inline] fn from_usize(n: usize) -> Self {
        Self(u32::try_from(n).expect("index overflow"))
      }
      #[inline] fn into_usize(self) -> usize { self.0 as usize }
    }
  };
}

pub(crate) use mk_idx;

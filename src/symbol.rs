//! Global string interner.
//!
//! Path components, field names and other source-level identifiers are
//! interned once and referred to everywhere else by a cheap, `Copy` index.
//! This mirrors the interner used by the frontend; the core only needs a
//! read side plus the ability to intern strings it synthesises itself
//! (mangled names, `#drop_glue` helpers, shim names, ...).

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, Mutex};

/// An interned string. Cheap to copy and compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
  /// The index of this symbol in the global table.
  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }

  /// Look up the string value of this symbol.
  #[must_use] pub fn as_str(self) -> &'static str { INTERNER.lock().unwrap().resolve(self) }
}

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:?}", self.as_str()) }
}
impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

struct Interner {
  map: HashMap<&'static str, Symbol>,
  vec: Vec<&'static str>,
  arena: typed_arena::Arena<u8>,
}

impl Interner {
  fn new() -> Self { Self { map: HashMap::new(), vec: Vec::new(), arena: typed_arena::Arena::new() } }

  fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    // Safety: the arena owns the bytes for the lifetime of the process; we
    // never remove entries, so the 'static borrow below is sound.
    let bytes = self.arena.alloc_extend(s.bytes());
    let s: &'static str = unsafe { std::str::from_utf8_unchecked(std::mem::transmute::<&[u8], &'static [u8]>(bytes)) };
    let sym = Symbol(self.vec.len() as u32);
    self.vec.push(s);
    self.map.insert(s, sym);
    sym
  }

  fn resolve(&self, sym: Symbol) -> &'static str { self.vec[sym.into_usize()] }
}

static INTERNER: LazyLock<Mutex<Interner>> = LazyLock::new(|| Mutex::new(Interner::new()));

/// Intern a string, returning its stable [`Symbol`].
#[must_use] pub fn intern(s: &str) -> Symbol { INTERNER.lock().unwrap().intern(s) }

/// Build a dense lookup table from symbol index to `T`, for small closed
/// sets of well-known symbols (keywords, intrinsic names, lang items).
#[must_use] pub fn init_dense_symbol_map<T: Copy>(entries: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let len = entries.iter().map(|(s, _)| s.into_usize() + 1).max().unwrap_or(0);
  let mut map = vec![None; len].into_boxed_slice();
  for &(s, v) in entries { map[s.into_usize()] = Some(v); }
  map
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_idempotent() {
    let a = intern("foo");
    let b = intern("foo");
    let c = intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_str(), "foo");
    assert_eq!(c.as_str(), "bar");
  }
}

//! String interner shared by the parse tree and the type interner.
//!
//! Member names cross the syntax/type boundary constantly during
//! narrowing, so both sides must hand out atoms from the same table for
//! `Atom` equality to be meaningful. The interner is a cheaply cloneable
//! handle; clones share storage.

use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use serde::Serialize;

/// A handle to an interned string. Equality is O(1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Atom(pub u32);

#[derive(Default)]
struct InternerInner {
    strings: Vec<Arc<str>>,
    ids: FxHashMap<Arc<str>, Atom>,
}

/// Deduplicating string storage. Clones share the same table.
#[derive(Clone, Default)]
pub struct Interner {
    inner: Arc<RwLock<InternerInner>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, s: &str) -> Atom {
        if let Some(&atom) = self.inner.read().unwrap().ids.get(s) {
            return atom;
        }
        let mut inner = self.inner.write().unwrap();
        // Re-check under the write lock; another clone may have raced us.
        if let Some(&atom) = inner.ids.get(s) {
            return atom;
        }
        let arc: Arc<str> = Arc::from(s);
        let atom = Atom(inner.strings.len() as u32);
        inner.strings.push(arc.clone());
        inner.ids.insert(arc, atom);
        atom
    }

    /// Resolve an atom to its string. Panics on a foreign atom; atoms are
    /// only valid against the interner that produced them.
    pub fn resolve(&self, atom: Atom) -> Arc<str> {
        self.inner.read().unwrap().strings[atom.0 as usize].clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_deduplicates() {
        let interner = Interner::new();
        let a = interner.intern("kind");
        let b = interner.intern("kind");
        let c = interner.intern("value");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*interner.resolve(a), "kind");
        assert_eq!(&*interner.resolve(c), "value");
    }

    #[test]
    fn clones_share_storage() {
        let interner = Interner::new();
        let clone = interner.clone();
        let a = interner.intern("director");
        let b = clone.intern("director");
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
    }
}

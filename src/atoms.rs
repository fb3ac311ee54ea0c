//! Process-wide interned atom names.
//!
//! Two atoms are equal iff their interned ids and arities are equal, so the
//! table is append-only: an id, once handed out, is stable for the lifetime
//! of the process. Readers may run concurrently (the proof-of-work workers
//! never intern, but error formatting on any thread may read).

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, RwLock};

use arcstr::ArcStr;

static ATOMS: LazyLock<RwLock<AtomTable>> = LazyLock::new(|| RwLock::new(AtomTable::new()));

struct AtomTable {
    names: Vec<ArcStr>,
    ids: HashMap<ArcStr, u32>,
}

impl AtomTable {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            ids: HashMap::new(),
        }
    }
}

/// An interned atom name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub(crate) u32);

impl Atom {
    pub fn new(name: &str) -> Self {
        if let Some(&id) = ATOMS.read().expect("atom table poisoned").ids.get(name) {
            return Self(id);
        }

        let mut table = ATOMS.write().expect("atom table poisoned");

        // Raced writers may have interned it in the meantime.
        if let Some(&id) = table.ids.get(name) {
            return Self(id);
        }

        let id = table.names.len() as u32;
        let name = ArcStr::from(name);
        table.names.push(name.clone());
        table.ids.insert(name, id);
        Self(id)
    }

    pub fn name(self) -> ArcStr {
        ATOMS.read().expect("atom table poisoned").names[self.0 as usize].clone()
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({})", self.name())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

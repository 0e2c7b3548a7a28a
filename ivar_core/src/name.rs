//! Interned attribute names.
//!
//! Every attribute name is interned once per process and afterwards handled
//! as a 4-byte `Name`. Comparison and hashing are integer operations.
//!
//! There are two disjoint namespaces:
//!
//! - **User names** (`Name::new`) are what ordinary attribute assignment uses.
//! - **Internal names** (`Name::internal`) are reserved for runtime metadata
//!   (class paths, constant tables, class-variable tables). The same spelling
//!   interned in both namespaces yields two different names, so user code can
//!   never reach an internal slot by assignment.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// High bit of the raw id marks the internal namespace.
const INTERNAL_BIT: u32 = 1 << 31;

/// Per-namespace limit. Keeps raw ids clear of the top values, which the
/// shape tree uses as edge sentinels.
const MAX_NAMES_PER_NAMESPACE: u32 = INTERNAL_BIT - 16;

/// An interned attribute name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Name(u32);

struct NameTable {
    ids: FxHashMap<Arc<str>, u32>,
    names: Vec<Arc<str>>,
}

impl NameTable {
    fn new() -> Self {
        Self {
            ids: FxHashMap::default(),
            names: Vec::new(),
        }
    }
}

struct Interner {
    user: RwLock<NameTable>,
    internal: RwLock<NameTable>,
}

static INTERNER: LazyLock<Interner> = LazyLock::new(|| Interner {
    user: RwLock::new(NameTable::new()),
    internal: RwLock::new(NameTable::new()),
});

fn intern_in(table: &RwLock<NameTable>, s: &str) -> u32 {
    if let Some(&id) = table.read().ids.get(s) {
        return id;
    }

    let mut table = table.write();
    // Another thread may have won the race between the two locks.
    if let Some(&id) = table.ids.get(s) {
        return id;
    }
    let id = table.names.len() as u32;
    assert!(id < MAX_NAMES_PER_NAMESPACE, "name table exhausted");
    let name: Arc<str> = Arc::from(s);
    table.ids.insert(Arc::clone(&name), id);
    table.names.push(name);
    id
}

impl Name {
    /// Intern a user-visible attribute name.
    pub fn new(s: &str) -> Self {
        Self(intern_in(&INTERNER.user, s))
    }

    /// Intern a name in the reserved internal namespace.
    pub fn internal(s: &str) -> Self {
        Self(intern_in(&INTERNER.internal, s) | INTERNAL_BIT)
    }

    /// Check if this name belongs to the internal namespace.
    #[inline]
    pub const fn is_internal(self) -> bool {
        self.0 & INTERNAL_BIT != 0
    }

    /// Get the raw id.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild a name from a raw id produced by [`Name::raw`].
    ///
    /// The raw id must come from an existing name; spelling lookups on a
    /// forged id panic.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Check if `raw` identifies an interned name.
    pub fn is_interned(raw: u32) -> bool {
        let index = (raw & !INTERNAL_BIT) as usize;
        let table = if raw & INTERNAL_BIT != 0 {
            &INTERNER.internal
        } else {
            &INTERNER.user
        };
        index < table.read().names.len()
    }

    /// Get the spelling of this name.
    pub fn as_str(self) -> Arc<str> {
        let index = (self.0 & !INTERNAL_BIT) as usize;
        let table = if self.is_internal() {
            INTERNER.internal.read()
        } else {
            INTERNER.user.read()
        };
        Arc::clone(&table.names[index])
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_internal() {
            write!(f, "Name(internal {:?})", self.as_str())
        } else {
            write!(f, "Name({:?})", self.as_str())
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

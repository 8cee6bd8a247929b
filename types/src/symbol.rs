//! Globally interned symbols.

use std::{
    collections::HashMap,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use once_cell::sync::Lazy;

/// Process-wide interning table. Read-mostly; looked up once per distinct
/// symbol name per encode or decode.
static INTERNED: Lazy<Mutex<HashMap<String, Symbol>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A symbol, interned process-wide by name.
///
/// Two lookups of one name yield handles sharing the same backing storage,
/// so symbol identity and symbol name agree.
#[derive(Clone)]
pub struct Symbol {
    name: Arc<str>,
}

impl Symbol {
    /// Returns the interned symbol for `name`.
    pub fn for_name(name: &str) -> Symbol {
        let mut table = INTERNED.lock().expect("symbol table poisoned");
        if let Some(existing) = table.get(name) {
            return existing.clone();
        }
        let symbol = Symbol {
            name: Arc::from(name),
        };
        table.insert(name.to_owned(), symbol.clone());
        symbol
    }

    /// The symbol's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Symbol) -> bool {
        // Interning makes pointer equality equivalent to name equality.
        Arc::ptr_eq(&self.name, &other.name)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.name())
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! Interned identifiers used for rule names, parameter names, and
//! transcript variable names.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

/// Error constructing a symbol.
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("symbol {text:?} contains {ch:?}: only [A-Za-z0-9_] is allowed")]
    InvalidChar { text: String, ch: char },
}

/// A globally-unique interned identifier over `[A-Za-z0-9_]`.
///
/// Equality is identity of the interned representative, so two symbols with
/// equal text are indistinguishable and compare in O(1). Ordering is
/// lexicographic over the text.
#[derive(Clone)]
pub struct Symbol(Arc<str>);

/// Process-wide intern table. The table owns the unique representative for
/// each distinct symbol text.
static INTERN_TABLE: OnceLock<Mutex<BTreeSet<Arc<str>>>> = OnceLock::new();

impl Symbol {
    /// Intern `text` as a symbol. Fails if the text contains a character
    /// outside `[A-Za-z0-9_]`. The empty symbol is valid.
    pub fn new(text: &str) -> Result<Self, SymbolError> {
        if let Some(ch) = text.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
            return Err(SymbolError::InvalidChar {
                text: text.to_string(),
                ch,
            });
        }
        let table = INTERN_TABLE.get_or_init(|| Mutex::new(BTreeSet::new()));
        let mut table = table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = table.get(text) {
            return Ok(Symbol(Arc::clone(existing)));
        }
        let interned: Arc<str> = Arc::from(text);
        table.insert(Arc::clone(&interned));
        Ok(Symbol(interned))
    }

    /// The symbol's text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the empty symbol.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Symbol {
    fn default() -> Self {
        // The empty string contains no invalid characters.
        Symbol::new("").unwrap_or_else(|_| unreachable!())
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        // Interning guarantees one representative per text.
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }
}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_ref().hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_interning() {
        let a = Symbol::new("expr").unwrap();
        let b = Symbol::new("expr").unwrap();
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_symbol_ordering() {
        let a = Symbol::new("add").unwrap();
        let b = Symbol::new("sub").unwrap();
        assert!(a < b);
        assert!(!(b < a));
    }

    #[test]
    fn test_symbol_rejects_invalid_chars() {
        assert!(Symbol::new("ok_123").is_ok());
        assert!(Symbol::new("not ok").is_err());
        assert!(Symbol::new("hy-phen").is_err());
        assert!(Symbol::new("").is_ok());
    }

    #[test]
    fn test_symbol_display() {
        let s = Symbol::new("res").unwrap();
        assert_eq!(s.to_string(), "res");
    }
}

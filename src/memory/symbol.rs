//! Symbol interning
//!
//! Every spelling is stored once, as an immutable UTF-8 series node
//! on the heap. Symbols are referenced by the compact node id of that
//! spelling so equality is a single integer comparison. Each spelling
//! links to its canon (the lower-cased spelling) so that words
//! differing only in case can be matched. Spellings are collectable;
//! the table drops any that do not survive a sweep.

use std::collections::HashMap;
use std::fmt;

use super::heap::NodeId;

/// A compact identifier for an interned spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Symbol(NodeId);

impl Symbol {
    pub(crate) fn from_node(node: NodeId) -> Self {
        Symbol(node)
    }

    /// The spelling node
    pub fn node(self) -> NodeId {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym{}", self.0)
    }
}

/// String to spelling lookup for interning.
#[derive(Debug, Default)]
pub struct SymbolTable {
    to_sym: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            to_sym: HashMap::new(),
        }
    }

    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.to_sym.get(s).copied()
    }

    pub fn insert(&mut self, s: &str, sym: Symbol) {
        self.to_sym.insert(s.to_string(), sym);
    }

    /// Drop entries whose spelling node did not survive collection
    pub fn retain_live<F: Fn(Symbol) -> bool>(&mut self, live: F) -> usize {
        let before = self.to_sym.len();
        self.to_sym.retain(|_, sym| live(*sym));
        before - self.to_sym.len()
    }

    /// Return the number of interned spellings.
    pub fn len(&self) -> usize {
        self.to_sym.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_sym.is_empty()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_lookup_after_insert() {
        let mut table = SymbolTable::new();
        let sym = Symbol::from_node(NodeId::from_index(3));
        table.insert("foo", sym);
        assert_eq!(table.lookup("foo"), Some(sym));
        assert_eq!(table.lookup("Foo"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    pub fn test_retain_live() {
        let mut table = SymbolTable::new();
        table.insert("a", Symbol::from_node(NodeId::from_index(0)));
        table.insert("b", Symbol::from_node(NodeId::from_index(1)));
        let dropped = table.retain_live(|s| s.node().index() == 1);
        assert_eq!(dropped, 1);
        assert!(table.lookup("a").is_none());
        assert!(!table.is_empty());
    }

    #[test]
    pub fn test_symbol_display() {
        let sym = Symbol::from_node(NodeId::from_index(5));
        assert_eq!(format!("{sym}"), "sym#5");
    }
}

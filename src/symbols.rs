//! Global symbol table owned by a [`Device`](crate::catalog::Device).
//!
//! The table is append-only and monotonic: inserting a name that already
//! exists is a no-op and the new value is dropped (first writer wins).

use rustc_hash::FxHashMap;

use crate::types::{SymbolKind, TypedValue};

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSymbol {
    pub name: String,
    pub value: TypedValue,
    pub kind: SymbolKind,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<GlobalSymbol>,
    index: FxHashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol. Returns false if the name already existed, in which
    /// case the provided value is discarded.
    pub fn add(&mut self, name: &str, value: TypedValue, kind: SymbolKind) -> bool {
        if self.index.contains_key(name) {
            return false;
        }
        self.index.insert(name.to_string(), self.symbols.len());
        self.symbols.push(GlobalSymbol {
            name: name.to_string(),
            value,
            kind,
        });
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, index: usize) -> Option<&GlobalSymbol> {
        self.symbols.get(index)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&TypedValue> {
        self.index.get(name).map(|&i| &self.symbols[i].value)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlobalSymbol> {
        self.symbols.iter()
    }
}

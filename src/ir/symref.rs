//! Symbols, symbol references and alias classes.
//!
//! A symbol is a storage location; a symbol reference is one way of naming
//! it (symbol plus offset). Several references may denote the same storage,
//! which is exactly what alias information captures: two references alias
//! when they resolve to the same symbol and offset. The optimizer does not
//! consult symbols directly — it works through reference indices, rebuilds
//! alias info on demand, and snapshots a canonical-representative table
//! that stays valid only while the reference count is stable.

use std::fmt;

/// Identifier of a [`Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub(crate) u32);

/// Identifier of a [`SymRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymRefId(pub(crate) u32);

impl SymRefId {
    /// Raw table index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymRefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Storage class of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Method-local temporary.
    Auto,
    /// Incoming parameter.
    Parm,
    /// Static storage.
    Static,
}

/// A storage location.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Storage class.
    pub kind: SymbolKind,
}

/// One way of naming a symbol: the symbol plus a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymRef {
    /// The referenced symbol.
    pub symbol: SymbolId,
    /// Byte offset into the symbol.
    pub offset: i32,
}

/// Alias classes over the reference table.
///
/// References in the same class may denote the same storage.
#[derive(Debug, Clone)]
pub struct AliasInfo {
    classes: Vec<u32>,
}

impl AliasInfo {
    /// May references `a` and `b` denote the same storage?
    #[must_use]
    pub fn may_alias(&self, a: SymRefId, b: SymRefId) -> bool {
        self.classes[a.index()] == self.classes[b.index()]
    }
}

/// The per-method symbol-reference table.
#[derive(Debug, Default)]
pub struct SymRefTable {
    symbols: Vec<Symbol>,
    refs: Vec<SymRef>,
    alias_info: Option<AliasInfo>,
}

impl SymRefTable {
    /// Index of the first non-reserved reference. Index 0 is reserved so a
    /// zero reference number can mean "none".
    pub const FIRST_USER_INDEX: u32 = 1;

    /// Creates a table holding only the reserved reference.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self::default();
        let reserved = table.create_symbol(SymbolKind::Auto);
        table.refs.push(SymRef {
            symbol: reserved,
            offset: 0,
        });
        table
    }

    /// Registers a new symbol.
    pub fn create_symbol(&mut self, kind: SymbolKind) -> SymbolId {
        self.symbols.push(Symbol { kind });
        SymbolId((self.symbols.len() - 1) as u32)
    }

    /// Registers a new reference to `symbol` at `offset`.
    ///
    /// Invalidation of alias info is the caller's concern: the optimizer
    /// compares reference counts around each pass and drops alias sets when
    /// the table grew.
    pub fn create_symref(&mut self, symbol: SymbolId, offset: i32) -> SymRefId {
        self.refs.push(SymRef { symbol, offset });
        SymRefId((self.refs.len() - 1) as u32)
    }

    /// Convenience: a fresh auto symbol plus a reference to it.
    pub fn create_auto(&mut self) -> SymRefId {
        let symbol = self.create_symbol(SymbolKind::Auto);
        self.create_symref(symbol, 0)
    }

    /// Number of references, the reserved slot included.
    #[must_use]
    pub fn symref_count(&self) -> u32 {
        self.refs.len() as u32
    }

    /// Borrows a reference entry.
    #[must_use]
    pub fn symref(&self, id: SymRefId) -> &SymRef {
        &self.refs[id.index()]
    }

    /// Storage class of `symbol`, if it exists.
    #[must_use]
    pub fn symbol_kind(&self, symbol: SymbolId) -> Option<SymbolKind> {
        self.symbols.get(symbol.0 as usize).map(|s| s.kind)
    }

    /// Iterates `(id, entry)` over the whole table.
    pub fn iter(&self) -> impl Iterator<Item = (SymRefId, &SymRef)> {
        self.refs
            .iter()
            .enumerate()
            .map(|(i, r)| (SymRefId(i as u32), r))
    }

    /// Rebuilds alias classes: references naming the same symbol and offset
    /// share a class.
    pub fn create_alias_info(&mut self) {
        let mut classes = vec![0u32; self.refs.len()];
        for (index, symref) in self.refs.iter().enumerate() {
            let mut class = index as u32;
            for (earlier_index, earlier) in self.refs.iter().enumerate().take(index) {
                if earlier.symbol == symref.symbol && earlier.offset == symref.offset {
                    class = earlier_index as u32;
                    break;
                }
            }
            classes[index] = class;
        }
        self.alias_info = Some(AliasInfo { classes });
    }

    /// Current alias classes, if built.
    #[must_use]
    pub fn alias_info(&self) -> Option<&AliasInfo> {
        self.alias_info.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliasing_by_symbol_and_offset() {
        let mut table = SymRefTable::new();
        let sym = table.create_symbol(SymbolKind::Auto);
        let a = table.create_symref(sym, 0);
        let b = table.create_symref(sym, 0);
        let c = table.create_symref(sym, 8);
        table.create_alias_info();
        let info = table.alias_info().unwrap();
        assert!(info.may_alias(a, b));
        assert!(!info.may_alias(a, c));
    }

    #[test]
    fn reserved_slot_counts() {
        let table = SymRefTable::new();
        assert_eq!(table.symref_count(), SymRefTable::FIRST_USER_INDEX);
    }
}

//! Locate-code to ticker binding for one run.
//!
//! Order-reference messages carry only a locate code. The Stock Directory
//! message is the feed's binding of locate to ticker; the table is filled
//! from it and owned by the engine, so two runs never share state.

use ahash::AHashMap;

use crate::types::Symbol;

/// Bidirectional locate <-> symbol map.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    by_locate: AHashMap<u16, Symbol>,
    by_symbol: AHashMap<Symbol, u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a locate to a symbol, replacing any earlier binding of either.
    ///
    /// Returns the symbol previously bound to `locate`, if it differed.
    pub fn bind(&mut self, locate: u16, symbol: Symbol) -> Option<Symbol> {
        let previous = self.by_locate.insert(locate, symbol);
        if let Some(old) = previous {
            if old != symbol {
                self.by_symbol.remove(&old);
            }
        }
        if let Some(old_locate) = self.by_symbol.insert(symbol, locate) {
            if old_locate != locate {
                self.by_locate.remove(&old_locate);
            }
        }
        previous.filter(|old| *old != symbol)
    }

    #[inline]
    pub fn resolve(&self, locate: u16) -> Option<Symbol> {
        self.by_locate.get(&locate).copied()
    }

    #[inline]
    pub fn locate_of(&self, symbol: &Symbol) -> Option<u16> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.by_locate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_locate.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, Symbol)> + '_ {
        self.by_locate.iter().map(|(l, s)| (*l, *s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_resolve() {
        let mut table = SymbolTable::new();
        assert!(table.is_empty());
        assert_eq!(table.bind(1, Symbol::new("AAPL")), None);
        assert_eq!(table.bind(2, Symbol::new("MSFT")), None);

        assert_eq!(table.resolve(1), Some(Symbol::new("AAPL")));
        assert_eq!(table.locate_of(&Symbol::new("MSFT")), Some(2));
        assert_eq!(table.resolve(3), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rebind_replaces_both_directions() {
        let mut table = SymbolTable::new();
        table.bind(1, Symbol::new("AAPL"));
        assert_eq!(table.bind(1, Symbol::new("AAPL")), None);
        assert_eq!(table.bind(1, Symbol::new("AAPLW")), Some(Symbol::new("AAPL")));
        assert_eq!(table.locate_of(&Symbol::new("AAPL")), None);

        // Symbol moves to a new locate
        table.bind(5, Symbol::new("AAPLW"));
        assert_eq!(table.resolve(1), None);
        assert_eq!(table.resolve(5), Some(Symbol::new("AAPLW")));
        assert_eq!(table.len(), 1);
    }
}

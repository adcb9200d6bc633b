//! Native symbol resolution for scripts using raw FFI addresses.
//!
//! Hosts register one resolver per symbol source (firmware table, plugin
//! table); the composite tries each in order. Resolvers are built on the
//! host thread and moved into the script thread, hence `Send`.

use rustc_hash::FxHashMap;

/// A resolved symbol handed to scripts as a foreign value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolAddress(pub usize);

/// One source of native symbol addresses.
pub trait SymbolResolver: Send {
    fn resolve(&self, name: &str) -> Option<usize>;
}

/// Tries each registered resolver in order; first hit wins.
#[derive(Default)]
pub struct CompositeResolver {
    sources: Vec<Box<dyn SymbolResolver>>,
}

impl CompositeResolver {
    pub fn new(sources: Vec<Box<dyn SymbolResolver>>) -> Self {
        Self { sources }
    }

    pub fn push(&mut self, source: Box<dyn SymbolResolver>) {
        self.sources.push(source);
    }
}

impl SymbolResolver for CompositeResolver {
    fn resolve(&self, name: &str) -> Option<usize> {
        self.sources.iter().find_map(|s| s.resolve(name))
    }
}

/// Fixed name-to-address table. What hosts use for statically known
/// symbol sets, and tests for everything.
pub struct TableResolver {
    table: FxHashMap<String, usize>,
}

impl TableResolver {
    pub fn new(entries: impl IntoIterator<Item = (String, usize)>) -> Self {
        Self {
            table: entries.into_iter().collect(),
        }
    }
}

impl SymbolResolver for TableResolver {
    fn resolve(&self, name: &str) -> Option<usize> {
        self.table.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_prefers_earlier_sources() {
        let first = TableResolver::new([("shared".to_owned(), 1), ("only_first".to_owned(), 2)]);
        let second = TableResolver::new([("shared".to_owned(), 9), ("only_second".to_owned(), 3)]);
        let composite = CompositeResolver::new(vec![Box::new(first), Box::new(second)]);
        assert_eq!(composite.resolve("shared"), Some(1));
        assert_eq!(composite.resolve("only_first"), Some(2));
        assert_eq!(composite.resolve("only_second"), Some(3));
        assert_eq!(composite.resolve("absent"), None);
    }
}

use indexmap::IndexMap;

use crate::grammar::{GrammarBuilder, START_SYMBOL};

/// A context-free grammar: an ordered mapping from non-terminal symbols to
/// their possible expansions.
///
/// The insertion order of a symbol's expansions is significant, it determines
/// tie-breaks under uniform selection. A grammar is built once and treated as
/// immutable for the rest of the fuzzing run.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: IndexMap<String, Vec<String>>,
    start: String,
}

impl Grammar {
    /// Build a validated Grammar from one or more JSON files.
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::new()
    }

    /// Wrap a plain rule mapping without validation. Symbols that are
    /// referenced but missing are passed through verbatim by the generator.
    pub fn new(rules: IndexMap<String, Vec<String>>) -> Self {
        Self {
            rules,
            start: START_SYMBOL.to_string(),
        }
    }

    pub(crate) fn with_start(rules: IndexMap<String, Vec<String>>, start: String) -> Self {
        Self { rules, start }
    }

    /// The symbol where generation starts.
    pub fn start(&self) -> &str {
        &self.start
    }

    /// The expansions of `symbol`, in insertion order.
    pub fn expansions(&self, symbol: &str) -> Option<&[String]> {
        self.rules.get(symbol).map(Vec::as_slice)
    }

    /// Whether `symbol` has rules in this grammar.
    pub fn contains(&self, symbol: &str) -> bool {
        self.rules.contains_key(symbol)
    }

    /// Iterate over all `(symbol, expansions)` rules in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.rules
            .iter()
            .map(|(symbol, expansions)| (symbol.as_str(), expansions.as_slice()))
    }

    /// Number of symbols in the grammar.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Total number of productions over all symbols.
    pub fn expansion_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn digits() -> Grammar {
        let mut rules = IndexMap::new();
        rules.insert("<start>".to_string(), vec!["<d>".to_string()]);
        rules.insert("<d>".to_string(), vec!["0".to_string(), "1".to_string()]);
        Grammar::new(rules)
    }

    #[test]
    fn test_accessors() {
        let grammar = digits();
        assert_eq!(grammar.start(), "<start>");
        assert_eq!(grammar.len(), 2);
        assert_eq!(grammar.expansion_count(), 3);
        assert!(grammar.contains("<d>"));
        assert!(!grammar.contains("<e>"));
        assert_eq!(
            grammar.expansions("<d>"),
            Some(&["0".to_string(), "1".to_string()][..])
        );
        assert_eq!(grammar.expansions("<e>"), None);
    }

    #[test]
    fn test_iteration_order() {
        let grammar = digits();
        let symbols: Vec<&str> = grammar.iter().map(|(symbol, _)| symbol).collect();
        assert_eq!(symbols, vec!["<start>", "<d>"]);
    }
}

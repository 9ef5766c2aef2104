use std::collections::{HashMap, HashSet};
use std::path::Path;

use indexmap::IndexMap;
use petgraph::{visit::Bfs, Graph};
use tracing::warn;

use crate::{
    error::{GrammarError, ParsingError},
    grammar::{is_nonterminal, tokens, Grammar, START_SYMBOL},
    parser::json::parse_json,
};

/// Loads and validates grammars, one JSON file at a time.
pub struct GrammarBuilder {
    rules: IndexMap<String, Vec<String>>,
    start: String,
    strict: bool,
}

impl GrammarBuilder {
    pub(crate) fn new() -> Self {
        Self {
            rules: IndexMap::new(),
            start: START_SYMBOL.to_string(),
            strict: false,
        }
    }

    /// Parse a single JSON grammar file: an object mapping `<symbol>` keys to
    /// arrays of expansion strings. C-style comments are allowed. Expansions
    /// for a symbol that was already loaded are appended in order.
    pub fn json_grammar<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ParsingError> {
        let new_rules = parse_json(path.as_ref())?;

        for (symbol, expansions) in new_rules {
            self.rules.entry(symbol).or_default().extend(expansions);
        }

        Ok(self)
    }

    /// Add a rule programmatically.
    pub fn rule<S: Into<String>>(mut self, symbol: S, expansions: &[&str]) -> Self {
        self.rules
            .entry(symbol.into())
            .or_default()
            .extend(expansions.iter().map(|e| e.to_string()));
        self
    }

    /// Override the start symbol (defaults to `<start>`).
    pub fn start_symbol<S: Into<String>>(mut self, symbol: S) -> Self {
        self.start = symbol.into();
        self
    }

    /// Fail on references to undefined non-terminals instead of leaving them
    /// for the generator to pass through verbatim.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn check_non_terminals(&self) -> Option<String> {
        let mut defined: HashSet<&str> = HashSet::with_capacity(self.rules.len());

        for symbol in self.rules.keys() {
            defined.insert(symbol);
        }

        for expansions in self.rules.values() {
            for expansion in expansions {
                for token in tokens(expansion) {
                    if is_nonterminal(token) && !defined.contains(token) {
                        return Some(token.to_string());
                    }
                }
            }
        }

        None
    }

    /// Flag rules that no derivation from the start symbol can ever use.
    /// They are kept anyway: coverage accounting enumerates the complete
    /// rule set, so silently dropping them would distort the stats.
    fn warn_unreachable(&self) {
        // One graph node per symbol, one edge per expansion reference
        let mut deps = Graph::<&str, ()>::new();
        let mut index_of = HashMap::with_capacity(self.rules.len());

        for (symbol, expansions) in &self.rules {
            let from = *index_of
                .entry(symbol.as_str())
                .or_insert_with(|| deps.add_node(symbol.as_str()));

            for expansion in expansions {
                for token in tokens(expansion) {
                    if is_nonterminal(token) && self.rules.contains_key(token) {
                        let to = *index_of
                            .entry(token)
                            .or_insert_with(|| deps.add_node(token));
                        deps.add_edge(from, to, ());
                    }
                }
            }
        }

        let Some(&entry) = index_of.get(self.start.as_str()) else {
            return;
        };

        let mut reached = HashSet::with_capacity(self.rules.len());
        let mut walk = Bfs::new(&deps, entry);
        while let Some(node) = walk.next(&deps) {
            reached.insert(deps[node]);
        }

        for symbol in self.rules.keys() {
            if !reached.contains(symbol.as_str()) {
                warn!("rule '{}' can never be derived from '{}'", symbol, self.start);
            }
        }
    }

    pub fn build(self) -> Result<Grammar, GrammarError> {
        if !self.rules.contains_key(&self.start) {
            return Err(GrammarError::MissingStartSymbol(self.start));
        }

        if self.strict {
            if let Some(nonterm) = self.check_non_terminals() {
                return Err(GrammarError::MissingNonTerminal(nonterm));
            }
        }

        self.warn_unreachable();

        Ok(Grammar::with_start(self.rules, self.start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_url_grammar() {
        let grammar = Grammar::builder()
            .json_grammar("test-data/grammars/url.json")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(grammar.start(), "<start>");
        assert!(grammar.contains("<digit>"));
        assert_eq!(grammar.expansions("<digit>").unwrap().len(), 10);
    }

    #[test]
    fn test_missing_start() {
        let result = Grammar::builder()
            .rule("<other>", &["a"])
            .build();

        assert!(matches!(result, Err(GrammarError::MissingStartSymbol(_))));
    }

    #[test]
    fn test_strict_rejects_undefined_refs() {
        let result = Grammar::builder()
            .rule("<start>", &["<missing>"])
            .strict(true)
            .build();

        match result {
            Err(GrammarError::MissingNonTerminal(symbol)) => assert_eq!(symbol, "<missing>"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_default_passes_undefined_refs() {
        let grammar = Grammar::builder()
            .rule("<start>", &["<missing>"])
            .build()
            .unwrap();

        assert!(!grammar.contains("<missing>"));
    }

    #[test]
    fn test_merge_appends_in_order() {
        let grammar = Grammar::builder()
            .rule("<start>", &["<d>"])
            .rule("<d>", &["0", "1"])
            .rule("<d>", &["2"])
            .build()
            .unwrap();

        assert_eq!(
            grammar.expansions("<d>").unwrap(),
            &["0".to_string(), "1".to_string(), "2".to_string()][..]
        );
    }
}

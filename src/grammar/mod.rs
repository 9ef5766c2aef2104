//! This is the frontend that loads and represents grammars.
//!
//! Use it like so:
//! ```no_run
//! use magpie_fuzz::grammar::Grammar;
//!
//! // Load multiple grammar files by joining their rules:
//! let grammar = Grammar::builder()
//!     .json_grammar("form-grammar.json").unwrap()
//!     .json_grammar("extra-rules.json").unwrap()
//!     .build().unwrap();
//! ```
//! A grammar maps non-terminal symbols to ordered lists of expansions. An
//! expansion is a whitespace-separated sequence of tokens, each either a
//! terminal or a non-terminal:
//! ```
//! use magpie_fuzz::grammar::is_nonterminal;
//!
//! assert!(is_nonterminal("<query>"));
//! assert!(!is_nonterminal("admin"));
//! ```

mod builder;
mod form;
mod map;

pub use builder::*;
pub use form::*;
pub use map::*;

/// The distinguished non-terminal where generation starts.
pub const START_SYMBOL: &str = "<start>";

/// Returns whether a token denotes a non-terminal (enclosed in `< >`).
pub fn is_nonterminal(token: &str) -> bool {
    token.starts_with('<') && token.ends_with('>')
}

/// Tokenise an expansion. Terminals cannot contain whitespace, so splitting
/// on it is lossless.
pub fn tokens(expansion: &str) -> impl Iterator<Item = &str> {
    expansion.split_whitespace()
}

/// Build the canonical coverage identifier for a `(symbol, expansion)` pair.
pub fn expansion_key(symbol: &str, expansion: &str) -> String {
    format!("{} -> {}", symbol, expansion)
}

/// Split a coverage identifier back into its symbol and expansion.
pub fn parse_expansion_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(" -> ")
}

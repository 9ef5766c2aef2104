use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use indexmap::IndexMap;
use json_comments::{CommentSettings, StripComments};
use serde_json as json;

use crate::{error::ParsingError, grammar::is_nonterminal};

/// Parse a single JSON grammar file: an object that maps non-terminal names
/// to arrays of expansion strings. C-style comments are allowed.
pub fn parse_json(path: &Path) -> Result<IndexMap<String, Vec<String>>, ParsingError> {
    let file = File::open(path).map_err(|e| ParsingError::new(path, e.to_string()))?;
    let reader = BufReader::new(file);
    let reader = StripComments::with_settings(CommentSettings::c_style(), reader);

    let rules: IndexMap<String, Vec<String>> = match json::from_reader(reader) {
        Ok(rules) => rules,
        Err(e) => {
            return Err(ParsingError::new(path, format!("Invalid grammar JSON: {}", e)));
        },
    };

    for symbol in rules.keys() {
        if !is_nonterminal(symbol) {
            return Err(ParsingError::new(
                path,
                format!("The key '{}' is not a non-terminal", symbol),
            ));
        }
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order() {
        let rules = parse_json(Path::new("test-data/grammars/url.json")).unwrap();

        assert!(rules.contains_key("<start>"));
        let digits = &rules["<digit>"];
        assert_eq!(digits.first().map(String::as_str), Some("0"));
        assert_eq!(digits.last().map(String::as_str), Some("9"));
    }

    #[test]
    fn test_parse_rejects_terminal_keys() {
        let err = parse_json(Path::new("test-data/grammars/terminal-key.json")).unwrap_err();
        assert!(err.to_string().contains("not a non-terminal"));
    }

    #[test]
    fn test_parse_missing_file() {
        assert!(parse_json(Path::new("test-data/grammars/does-not-exist.json")).is_err());
    }
}

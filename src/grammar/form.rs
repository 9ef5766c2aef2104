use indexmap::IndexMap;

use crate::grammar::{Grammar, START_SYMBOL};

/// A single field of an HTML form, as reported by the form parser.
#[derive(Debug, Clone, Default)]
pub struct FormField {
    pub name: String,
    pub field_type: String,
    /// Values of `select` options.
    pub options: Vec<String>,
    pub required: bool,
    /// HTML5 pattern attribute, if present.
    pub pattern: Option<String>,
}

impl FormField {
    pub fn new<S: Into<String>, T: Into<String>>(name: S, field_type: T) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            ..Self::default()
        }
    }
}

/// Everything the form parser reports about a form: where it submits to and
/// which fields it carries. This is the narrow contract between form
/// discovery and the fuzzing core.
#[derive(Debug, Clone)]
pub struct FormDescriptor {
    /// Resolved form action URL.
    pub action: String,
    /// Form method, `GET` or `POST`.
    pub method: String,
    pub fields: Vec<FormField>,
}

impl FormDescriptor {
    pub fn new<S: Into<String>, M: Into<String>>(action: S, method: M) -> Self {
        Self {
            action: action.into(),
            method: method.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    /// Synthesise a URL grammar for this form.
    ///
    /// Terminals cannot contain whitespace, so multi-part fragments are
    /// emitted as adjacent terminal tokens that the leaf string joins back
    /// together: `<action> ? <query>` flattens to `action?k=v&...`.
    pub fn to_grammar(&self) -> Grammar {
        let mut rules: IndexMap<String, Vec<String>> = IndexMap::new();

        if self.fields.is_empty() {
            rules.insert(START_SYMBOL.to_string(), vec!["<action>".to_string()]);
        } else {
            rules.insert(START_SYMBOL.to_string(), vec!["<action> ? <query>".to_string()]);
        }
        rules.insert("<action>".to_string(), vec![self.action.clone()]);

        let mut query_parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let symbol = format!("<{}>", field.name);
            query_parts.push(format!("{} = {}", field.name, symbol));

            let expansions = match field.field_type.as_str() {
                "select" => field.options.clone(),
                "number" => vec!["<number>".to_string()],
                "email" => vec!["<email>".to_string()],
                "checkbox" => vec!["on".to_string(), "off".to_string()],
                _ => vec!["<text>".to_string()],
            };
            rules.insert(symbol, expansions);
        }

        if !self.fields.is_empty() {
            rules.insert("<query>".to_string(), vec![query_parts.join(" & ")]);
        }

        /* Base rules shared by all field types */
        let base: &[(&str, &[&str])] = &[
            ("<text>", &["<string>"]),
            ("<string>", &["<letter>", "<letter> <string>"]),
            ("<letter>", &["<plus>", "<percent>", "<other>"]),
            ("<plus>", &["+"]),
            ("<percent>", &["% <hexdigit> <hexdigit>"]),
            (
                "<hexdigit>",
                &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "a", "b", "c", "d", "e", "f"],
            ),
            ("<other>", &["0", "1", "2", "3", "4", "5", "a", "b", "c", "d", "e", "-", "_"]),
            ("<number>", &["<digits>"]),
            ("<digits>", &["<digit>", "<digit> <digits>"]),
            ("<digit>", &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]),
            ("<email>", &["<string> @ <string>"]),
        ];
        for (symbol, expansions) in base {
            rules.insert(
                symbol.to_string(),
                expansions.iter().map(|e| e.to_string()).collect(),
            );
        }

        Grammar::new(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::tokens;

    fn search_form() -> FormDescriptor {
        FormDescriptor::new("http://example.com/search", "GET")
            .field(FormField::new("q", "text"))
            .field(FormField {
                name: "category".to_string(),
                field_type: "select".to_string(),
                options: vec!["books".to_string(), "music".to_string()],
                ..FormField::default()
            })
            .field(FormField::new("page", "number"))
    }

    #[test]
    fn test_query_rule_shape() {
        let grammar = search_form().to_grammar();

        assert_eq!(
            grammar.expansions("<query>").unwrap(),
            &["q = <q> & category = <category> & page = <page>".to_string()][..]
        );
        assert_eq!(
            grammar.expansions("<category>").unwrap(),
            &["books".to_string(), "music".to_string()][..]
        );
        assert_eq!(grammar.expansions("<page>").unwrap(), &["<number>".to_string()][..]);
    }

    #[test]
    fn test_start_rule_tokenises_cleanly() {
        let grammar = search_form().to_grammar();
        let start = &grammar.expansions("<start>").unwrap()[0];
        let toks: Vec<&str> = tokens(start).collect();

        assert_eq!(toks, vec!["<action>", "?", "<query>"]);
    }

    #[test]
    fn test_form_without_fields() {
        let grammar = FormDescriptor::new("http://example.com/ping", "GET").to_grammar();

        assert_eq!(grammar.expansions("<start>").unwrap(), &["<action>".to_string()][..]);
        assert!(!grammar.contains("<query>"));
    }
}

//! String and URL mutation operators for the mutation-based fuzzing loops.

mod scheduler;

pub use scheduler::*;

use rand::{rngs::StdRng, Rng};
use url::Url;

/// Attack payloads for the dictionary-replace operator.
pub const ATTACK_PAYLOADS: &[&str] = &[
    "../../../etc/passwd",
    "<script>alert(1)</script>",
    "' OR '1'='1",
    "%00",
    "../../../../etc/passwd%00",
    "$(cat /etc/passwd)",
    "{{7*7}}",
];

const SPECIAL_CHARS: &[&str] = &["<", ">", "'", "\"", ";", "%00", "%0d%0a"];

/// Applies random URL-level mutations, falling back to string-level byte
/// mutations for the individual components.
///
/// The mutator owns its RNG, so mutation sequences are reproducible from a
/// seed. Inputs that do not parse as URLs are returned unchanged.
pub struct UrlMutator {
    rng: StdRng,
}

impl UrlMutator {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    /// Apply one random URL-level mutation operator to `input`.
    pub fn mutate(&mut self, input: &str) -> String {
        let Ok(url) = Url::parse(input) else {
            return input.to_string();
        };

        match self.rng.gen_range(0..4) {
            0 => self.mutate_path_segment(&url),
            1 => self.mutate_query(&url),
            2 => Self::prepend_traversal(&url),
            _ => self.append_special(&url),
        }
    }

    /// Apply one random mutation to a plain string. Empty inputs return the
    /// constant `"fuzz"`.
    pub fn mutate_string(&mut self, s: &str) -> String {
        if s.is_empty() {
            return "fuzz".to_string();
        }

        match self.rng.gen_range(0..4) {
            0 => {
                // Bit flip
                let mut bytes = s.as_bytes().to_vec();
                let pos = self.rng.gen_range(0..bytes.len());
                bytes[pos] ^= 1 << self.rng.gen_range(0..8);
                String::from_utf8_lossy(&bytes).into_owned()
            },
            1 => {
                // Byte insert
                let mut bytes = s.as_bytes().to_vec();
                let pos = self.rng.gen_range(0..=bytes.len());
                bytes.insert(pos, self.rng.gen::<u8>());
                String::from_utf8_lossy(&bytes).into_owned()
            },
            2 => {
                // Byte delete
                let mut bytes = s.as_bytes().to_vec();
                let pos = self.rng.gen_range(0..bytes.len());
                bytes.remove(pos);
                String::from_utf8_lossy(&bytes).into_owned()
            },
            _ => ATTACK_PAYLOADS[self.rng.gen_range(0..ATTACK_PAYLOADS.len())].to_string(),
        }
    }

    fn mutate_path_segment(&mut self, url: &Url) -> String {
        let mut segments: Vec<String> = url.path().split('/').map(str::to_string).collect();
        let idx = self.rng.gen_range(0..segments.len());
        segments[idx] = self.mutate_string(&segments[idx]);

        let mut url = url.clone();
        url.set_path(&segments.join("/"));
        url.to_string()
    }

    fn mutate_query(&mut self, url: &Url) -> String {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let mut url = url.clone();

        {
            let mut editor = url.query_pairs_mut();
            editor.clear();

            if pairs.is_empty() {
                let key = self.mutate_string("param");
                let value = self.mutate_string("value");
                editor.append_pair(&key, &value);
            } else {
                // Replace the value of the first parameter, keep the rest
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i == 0 {
                        let mutated = self.mutate_string(value);
                        editor.append_pair(key, &mutated);
                    } else {
                        editor.append_pair(key, value);
                    }
                }
            }
        }

        url.to_string()
    }

    fn prepend_traversal(url: &Url) -> String {
        let path = format!("/../{}", url.path().trim_start_matches('/'));
        Self::rebuild(url, &path)
    }

    fn append_special(&mut self, url: &Url) -> String {
        let special = SPECIAL_CHARS[self.rng.gen_range(0..SPECIAL_CHARS.len())];
        let path = format!("{}{}", url.path(), special);
        Self::rebuild(url, &path)
    }

    /// Textual rebuild from components. The Url setters would normalise away
    /// `..` segments and percent-encode the special characters, which is
    /// exactly what these operators need to avoid.
    fn rebuild(url: &Url, path: &str) -> String {
        let mut out = format!("{}://", url.scheme());
        if let Some(host) = url.host_str() {
            out.push_str(host);
        }
        if let Some(port) = url.port() {
            out.push(':');
            out.push_str(&port.to_string());
        }
        out.push_str(path);
        if let Some(query) = url.query() {
            out.push('?');
            out.push_str(query);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn mutator(seed: u64) -> UrlMutator {
        UrlMutator::new(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_empty_string_yields_sentinel() {
        assert_eq!(mutator(0).mutate_string(""), "fuzz");
    }

    #[test]
    fn test_attack_dictionary_is_exact() {
        assert_eq!(
            ATTACK_PAYLOADS,
            &[
                "../../../etc/passwd",
                "<script>alert(1)</script>",
                "' OR '1'='1",
                "%00",
                "../../../../etc/passwd%00",
                "$(cat /etc/passwd)",
                "{{7*7}}",
            ]
        );
    }

    #[test]
    fn test_unparseable_input_is_returned_unchanged() {
        assert_eq!(mutator(1).mutate("::not a url::"), "::not a url::");
    }

    #[test]
    fn test_mutate_string_never_empties_longer_inputs() {
        for seed in 0..64u64 {
            let mut m = mutator(seed);
            assert!(!m.mutate_string("value").is_empty());
        }
    }

    #[test]
    fn test_prepend_traversal() {
        let url = Url::parse("http://host:8080/a/b?x=1").unwrap();
        assert_eq!(
            UrlMutator::prepend_traversal(&url),
            "http://host:8080/../a/b?x=1"
        );
    }

    #[test]
    fn test_append_special_keeps_query() {
        let url = Url::parse("http://host/a?x=1").unwrap();
        let mut m = mutator(3);
        let out = m.append_special(&url);

        assert!(out.starts_with("http://host/a"));
        assert!(out.ends_with("?x=1"));
        assert!(out.len() > "http://host/a?x=1".len());
    }

    #[test]
    fn test_mutate_query_replaces_first_value() {
        // Dictionary replace is operator 3; force it by scanning seeds until
        // the mutated value is a payload, then check shape
        for seed in 0..64 {
            let url = Url::parse("http://host/a?x=1&y=2").unwrap();
            let out = mutator(seed).mutate_query(&url);
            let out = Url::parse(&out).unwrap();
            let pairs: Vec<(String, String)> = out.query_pairs().into_owned().collect();

            assert_eq!(pairs.len(), 2);
            assert_eq!(pairs[0].0, "x");
            assert_eq!(pairs[1], ("y".to_string(), "2".to_string()));
        }
    }

    #[test]
    fn test_mutate_query_adds_parameter_when_absent() {
        let url = Url::parse("http://host/a").unwrap();
        let out = mutator(4).mutate_query(&url);
        let out = Url::parse(&out).unwrap();

        assert_eq!(out.query_pairs().count(), 1);
    }

    #[test]
    fn test_mutate_produces_a_value() {
        let mut m = mutator(5);
        let mut input = "http://host/a/b?x=1".to_string();
        for _ in 0..32 {
            input = m.mutate(&input);
            assert!(!input.is_empty());
        }
    }
}

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::FuzzResponse;

/// Default bound on the body-hash set. Long runs would otherwise accumulate
/// hashes without limit.
pub const DEFAULT_HASH_CAP: usize = 65536;

/// Value coverage of a single query parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParamStats {
    pub unique_values: usize,
}

/// A snapshot of response-coverage progress.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseStats {
    pub unique_responses: usize,
    pub status_codes: BTreeMap<u16, u64>,
    pub paths: Vec<String>,
    pub parameters: BTreeMap<String, ParamStats>,
}

#[derive(Debug, Default)]
struct State {
    /// Body hash to occurrence count, insertion ordered so the oldest entry
    /// can be evicted when the cap is hit.
    responses: IndexMap<[u8; 32], u64>,
    status_codes: BTreeMap<u16, u64>,
    paths: HashSet<String>,
    params: HashSet<String>,
    values: HashMap<String, HashSet<String>>,
}

impl State {
    fn track_url(&mut self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        let mut is_new = self.paths.insert(parsed.path().to_string());

        for (param, value) in parsed.query_pairs() {
            is_new |= self.params.insert(param.to_string());
            is_new |= self
                .values
                .entry(param.to_string())
                .or_default()
                .insert(value.to_string());
        }

        is_new
    }
}

/// Tracks the behavioural coverage observed from HTTP responses: status
/// codes, body hashes, URL paths, query parameter names and values.
///
/// Shared between workers with the same discipline as [`GrammarCoverage`]:
/// writes take the exclusive lock, reads the shared lock.
///
/// [`GrammarCoverage`]: crate::coverage::GrammarCoverage
#[derive(Debug)]
pub struct ResponseCoverage {
    hash_cap: usize,
    state: RwLock<State>,
}

impl ResponseCoverage {
    pub fn new() -> Self {
        Self::with_hash_cap(DEFAULT_HASH_CAP)
    }

    /// Bound the body-hash set to `cap` entries; the oldest entry is evicted
    /// once the cap is hit. A cap of 0 disables the bound.
    pub fn with_hash_cap(cap: usize) -> Self {
        Self {
            hash_cap: cap,
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap()
    }

    /// Record a response and the URL that produced it. Returns true when any
    /// component (status code, body hash, path, parameter name or value) was
    /// newly seen.
    pub fn track(&self, response: &FuzzResponse) -> bool {
        let mut state = self.write();
        let mut is_new = false;

        let status = response.status();
        if !state.status_codes.contains_key(&status) {
            is_new = true;
        }
        *state.status_codes.entry(status).or_insert(0) += 1;

        let hash: [u8; 32] = Sha256::digest(response.body()).into();
        if !state.responses.contains_key(&hash) {
            is_new = true;
            if self.hash_cap > 0 {
                while state.responses.len() >= self.hash_cap {
                    let _ = state.responses.shift_remove_index(0);
                }
            }
        }
        *state.responses.entry(hash).or_insert(0) += 1;

        is_new |= state.track_url(response.url());

        is_new
    }

    /// Record only the URL components of an input. Returns true when the
    /// path, a parameter name or a parameter value was newly seen.
    pub fn track_url(&self, url: &str) -> bool {
        self.write().track_url(url)
    }

    /// Whether `url` would contribute new coverage, judged by its components
    /// alone, without executing anything.
    pub fn has_new_coverage(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        let state = self.read();

        if !state.paths.contains(parsed.path()) {
            return true;
        }

        for (param, value) in parsed.query_pairs() {
            if !state.params.contains(param.as_ref()) {
                return true;
            }
            match state.values.get(param.as_ref()) {
                Some(values) => {
                    if !values.contains(value.as_ref()) {
                        return true;
                    }
                },
                None => return true,
            }
        }

        false
    }

    /// Number of distinct response bodies seen.
    pub fn unique_responses(&self) -> usize {
        self.read().responses.len()
    }

    /// How often `status` was observed.
    pub fn status_count(&self, status: u16) -> u64 {
        self.read().status_codes.get(&status).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> ResponseStats {
        let state = self.read();

        let mut paths: Vec<String> = state.paths.iter().cloned().collect();
        paths.sort();

        let mut parameters = BTreeMap::new();
        for param in &state.params {
            let unique_values = state.values.get(param).map_or(0, |v| v.len());
            parameters.insert(param.clone(), ParamStats { unique_values });
        }

        ResponseStats {
            unique_responses: state.responses.len(),
            status_codes: state.status_codes.clone(),
            paths,
            parameters,
        }
    }

    /// Clear all recorded coverage.
    pub fn reset(&self) {
        let mut state = self.write();
        *state = State::default();
    }
}

impl Default for ResponseCoverage {
    fn default() -> Self {
        Self::new()
    }
}

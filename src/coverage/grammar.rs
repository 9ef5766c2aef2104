use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    grammar::{expansion_key, Grammar},
    tree::DerivationTree,
};

/// Coverage of a single symbol's expansions.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolStats {
    pub total: usize,
    pub covered: usize,
    pub percentage: f64,
}

/// A snapshot of grammar-coverage progress.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageStats {
    pub total_expansions: usize,
    pub covered_expansions: usize,
    pub coverage_percentage: f64,
    pub by_symbol: IndexMap<String, SymbolStats>,
}

#[derive(Debug, Default)]
struct State {
    covered: HashMap<String, u64>,
    priorities: HashMap<String, f64>,
    trees: HashSet<String>,
}

/// Tracks how often each `(symbol, expansion)` pair has been used and derives
/// the priority scores that bias expansion choice towards under-covered
/// productions.
///
/// The tracker holds an immutable snapshot of the grammar's expansions and is
/// shared between workers: mutating operations take the exclusive lock, reads
/// take the shared lock. Priorities are recomputed inside the exclusive
/// region, so readers never observe stale totals.
#[derive(Debug)]
pub struct GrammarCoverage {
    expansions: IndexMap<String, Vec<String>>,
    state: RwLock<State>,
}

impl GrammarCoverage {
    /// Create a tracker over a snapshot of `grammar`.
    pub fn new(grammar: &Grammar) -> Self {
        let mut expansions = IndexMap::with_capacity(grammar.len());
        for (symbol, exps) in grammar.iter() {
            expansions.insert(symbol.to_string(), exps.to_vec());
        }

        Self {
            expansions,
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap()
    }

    /// Record one use of `expansion` for `symbol`.
    pub fn track_expansion(&self, symbol: &str, expansion: &str) {
        let mut state = self.write();
        *state.covered.entry(expansion_key(symbol, expansion)).or_insert(0) += 1;
        self.update_priorities(&mut state);
    }

    /// Record every `(symbol, expansion)` pair used by `tree` and remember
    /// its serialised form.
    pub fn track_tree(&self, tree: &DerivationTree) {
        let mut state = self.write();

        state.trees.insert(tree.serialize());

        for (symbol, expansion) in tree.expansions() {
            *state.covered.entry(expansion_key(symbol, expansion)).or_insert(0) += 1;
        }

        self.update_priorities(&mut state);
    }

    /// Remember a finished tree for deduplication without touching the
    /// expansion counts. The generator already counted each expansion while
    /// building the tree. Returns true if the tree was not seen before.
    pub fn insert_tree(&self, tree: &DerivationTree) -> bool {
        self.write().trees.insert(tree.serialize())
    }

    /// Priority score of an expansion, in `[0, 1]`. Uncovered expansions
    /// score 1.0.
    pub fn priority(&self, symbol: &str, expansion: &str) -> f64 {
        self.read()
            .priorities
            .get(&expansion_key(symbol, expansion))
            .copied()
            .unwrap_or(1.0)
    }

    /// Priorities of all of a symbol's expansions under a single lock
    /// acquisition.
    pub fn priorities_for(&self, symbol: &str, expansions: &[String]) -> Vec<f64> {
        let state = self.read();
        expansions
            .iter()
            .map(|expansion| {
                state
                    .priorities
                    .get(&expansion_key(symbol, expansion))
                    .copied()
                    .unwrap_or(1.0)
            })
            .collect()
    }

    /// Whether the expansion behind `key` has been used at least once.
    pub fn is_covered(&self, key: &str) -> bool {
        self.read().covered.get(key).copied().unwrap_or(0) > 0
    }

    /// How often the expansion behind `key` has been used.
    pub fn coverage_count(&self, key: &str) -> u64 {
        self.read().covered.get(key).copied().unwrap_or(0)
    }

    /// Whether every expansion of every symbol has been used at least once.
    pub fn has_full_coverage(&self) -> bool {
        let state = self.read();
        for (symbol, expansions) in &self.expansions {
            for expansion in expansions {
                if state.covered.get(&expansion_key(symbol, expansion)).copied().unwrap_or(0) == 0 {
                    return false;
                }
            }
        }
        true
    }

    /// Keys of all expansions that have not been used yet, in grammar order.
    pub fn uncovered_expansions(&self) -> Vec<String> {
        let state = self.read();
        let mut uncovered = Vec::new();
        for (symbol, expansions) in &self.expansions {
            for expansion in expansions {
                let key = expansion_key(symbol, expansion);
                if state.covered.get(&key).copied().unwrap_or(0) == 0 {
                    uncovered.push(key);
                }
            }
        }
        uncovered
    }

    /// Number of distinct derivation trees seen so far.
    pub fn tree_count(&self) -> usize {
        self.read().trees.len()
    }

    /// Coverage statistics, overall and per symbol.
    pub fn stats(&self) -> CoverageStats {
        let state = self.read();

        let mut total = 0;
        let mut covered = 0;
        let mut by_symbol = IndexMap::with_capacity(self.expansions.len());

        for (symbol, expansions) in &self.expansions {
            let symbol_total = expansions.len();
            let mut symbol_covered = 0;
            for expansion in expansions {
                if state.covered.get(&expansion_key(symbol, expansion)).copied().unwrap_or(0) > 0 {
                    symbol_covered += 1;
                }
            }

            total += symbol_total;
            covered += symbol_covered;

            let percentage = if symbol_total > 0 {
                symbol_covered as f64 / symbol_total as f64 * 100.0
            } else {
                0.0
            };
            by_symbol.insert(
                symbol.clone(),
                SymbolStats {
                    total: symbol_total,
                    covered: symbol_covered,
                    percentage,
                },
            );
        }

        let coverage_percentage = if total > 0 {
            covered as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        CoverageStats {
            total_expansions: total,
            covered_expansions: covered,
            coverage_percentage,
            by_symbol,
        }
    }

    /// Clear all counts, priorities and seen trees. The expansion snapshot is
    /// kept.
    pub fn reset(&self) {
        let mut state = self.write();
        state.covered.clear();
        state.priorities.clear();
        state.trees.clear();
    }

    /// Recompute all priorities from the current counts. For each symbol the
    /// total usage acts as the denominator: covered expansions are penalised
    /// in proportion to how dominant they have become, uncovered ones stay at
    /// 1.0.
    fn update_priorities(&self, state: &mut State) {
        state.priorities.clear();

        for (symbol, expansions) in &self.expansions {
            let mut total: u64 = expansions
                .iter()
                .map(|e| state.covered.get(&expansion_key(symbol, e)).copied().unwrap_or(0))
                .sum();
            if total == 0 {
                total = 1;
            }

            for expansion in expansions {
                let key = expansion_key(symbol, expansion);
                let count = state.covered.get(&key).copied().unwrap_or(0);
                let priority = if count == 0 {
                    1.0
                } else {
                    1.0 - count as f64 / total as f64
                };
                state.priorities.insert(key, priority);
            }
        }
    }
}

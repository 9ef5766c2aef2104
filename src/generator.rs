//! Depth-bounded derivation-tree generation steered by grammar coverage.

use std::sync::Arc;

use rand::{rngs::StdRng, Rng};

use crate::{
    coverage::GrammarCoverage,
    grammar::{expansion_key, is_nonterminal, tokens, Grammar},
    tree::{DerivationTree, NodeId},
};

/// Value of the leaf emitted when the depth bound cuts an expansion short.
pub const MAX_DEPTH_REACHED: &str = "max_depth_reached";

/// Strategy for picking one of a symbol's expansions during generation.
/// Returns the index of the chosen expansion.
pub trait ChooseExpansion {
    fn choose(
        &self,
        rng: &mut StdRng,
        symbol: &str,
        expansions: &[String],
        coverage: &GrammarCoverage,
    ) -> usize;
}

/// Roulette-wheel choice proportional to coverage priorities: uncovered
/// expansions float to the top, covered ones are penalised by how dominant
/// they have become within their symbol.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedChoice;

impl ChooseExpansion for WeightedChoice {
    fn choose(
        &self,
        rng: &mut StdRng,
        symbol: &str,
        expansions: &[String],
        coverage: &GrammarCoverage,
    ) -> usize {
        let priorities = coverage.priorities_for(symbol, expansions);
        let total: f64 = priorities.iter().sum();

        if total > 0.0 {
            let point = rng.gen_range(0.0..total);
            let mut sum = 0.0;
            for (i, priority) in priorities.iter().enumerate() {
                sum += priority;
                if point < sum {
                    return i;
                }
            }
        }

        // All priorities zero, defended against but unreachable under the
        // priority rule
        rng.gen_range(0..expansions.len())
    }
}

/// Two-tier uniform choice: draw from the locally uncovered expansions while
/// any exist, otherwise from all of them. Covers each symbol's productions
/// breadth-first before repeating any.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystematicChoice;

impl ChooseExpansion for SystematicChoice {
    fn choose(
        &self,
        rng: &mut StdRng,
        symbol: &str,
        expansions: &[String],
        coverage: &GrammarCoverage,
    ) -> usize {
        let uncovered: Vec<usize> = expansions
            .iter()
            .enumerate()
            .filter(|(_, expansion)| !coverage.is_covered(&expansion_key(symbol, expansion)))
            .map(|(i, _)| i)
            .collect();

        if !uncovered.is_empty() {
            return uncovered[rng.gen_range(0..uncovered.len())];
        }

        rng.gen_range(0..expansions.len())
    }
}

/// Builds derivation trees by depth-bounded recursive descent, recording
/// every chosen expansion in the shared coverage tracker as it goes.
///
/// Symbols without rules, including unknown non-terminals, become leaves that
/// stand for themselves. The generator owns its RNG, so sessions are
/// reproducible from a seed.
pub struct GrammarGenerator<C> {
    grammar: Arc<Grammar>,
    coverage: Arc<GrammarCoverage>,
    chooser: C,
    max_depth: u32,
    rng: StdRng,
}

/// Generator with priority-weighted expansion choice.
pub type CoverageGenerator = GrammarGenerator<WeightedChoice>;

/// Generator that exhausts each symbol's uncovered expansions first.
pub type SystematicGenerator = GrammarGenerator<SystematicChoice>;

impl<C: ChooseExpansion> GrammarGenerator<C> {
    pub fn new(
        grammar: Arc<Grammar>,
        coverage: Arc<GrammarCoverage>,
        chooser: C,
        max_depth: u32,
        rng: StdRng,
    ) -> Self {
        Self {
            grammar,
            coverage,
            chooser,
            max_depth,
            rng,
        }
    }

    /// Generate one derivation tree from the grammar's start symbol.
    pub fn generate(&mut self) -> DerivationTree {
        let start = self.grammar.start().to_string();
        self.generate_from(&start)
    }

    /// Generate one derivation tree rooted at `symbol`.
    pub fn generate_from(&mut self, symbol: &str) -> DerivationTree {
        let mut tree = DerivationTree::new(symbol);
        let root = tree.root();
        self.expand(&mut tree, root, symbol, 1);
        tree
    }

    fn expand(&mut self, tree: &mut DerivationTree, node: NodeId, symbol: &str, depth: u32) {
        if depth > self.max_depth {
            tree.set_value(node, MAX_DEPTH_REACHED);
            return;
        }

        let grammar = Arc::clone(&self.grammar);
        let expansions = match grammar.expansions(symbol) {
            Some(expansions) if !expansions.is_empty() => expansions,
            // No rules: the symbol stands for itself
            _ => {
                tree.set_value(node, symbol);
                return;
            },
        };

        let idx = self
            .chooser
            .choose(&mut self.rng, symbol, expansions, &self.coverage);
        let expansion = &expansions[idx];

        tree.set_expansion(node, expansion.as_str());
        self.coverage.track_expansion(symbol, expansion);

        for token in tokens(expansion) {
            let child = tree.add_child(node, token);
            if is_nonterminal(token) {
                self.expand(tree, child, token, depth + 1);
            } else {
                tree.set_value(child, token);
            }
        }
    }
}

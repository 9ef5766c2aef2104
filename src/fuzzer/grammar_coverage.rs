use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info};

use crate::{
    coverage::{CoverageStats, GrammarCoverage, ResponseCoverage},
    error::Error,
    fuzzer::{claim_request, Config, Fuzzer, Report, StopToken},
    generator::{ChooseExpansion, GrammarGenerator, SystematicChoice, WeightedChoice},
    grammar::Grammar,
    http::Executor,
};

/// Grammar fuzzing session: each worker generates a derivation tree,
/// flattens it to an input, executes it and records response coverage.
/// Inputs that reach new response coverage are kept as interesting.
pub struct CoverageGuidedFuzzer<C> {
    config: Config,
    grammar: Arc<Grammar>,
    chooser: C,
    coverage: Arc<GrammarCoverage>,
    responses: Arc<ResponseCoverage>,
    executor: Arc<dyn Executor>,
    stop: StopToken,
}

/// Session with priority-weighted expansion choice.
pub type GrammarCoverageFuzzer = CoverageGuidedFuzzer<WeightedChoice>;

/// Session that exhausts each symbol's uncovered expansions first.
pub type SystematicCoverageFuzzer = CoverageGuidedFuzzer<SystematicChoice>;

impl GrammarCoverageFuzzer {
    pub fn new(
        config: Config,
        grammar: Grammar,
        executor: Arc<dyn Executor>,
        stop: StopToken,
    ) -> Self {
        Self::with_chooser(config, grammar, WeightedChoice, executor, stop)
    }
}

impl SystematicCoverageFuzzer {
    pub fn new(
        config: Config,
        grammar: Grammar,
        executor: Arc<dyn Executor>,
        stop: StopToken,
    ) -> Self {
        Self::with_chooser(config, grammar, SystematicChoice, executor, stop)
    }
}

impl<C: ChooseExpansion + Copy + Send + Sync> CoverageGuidedFuzzer<C> {
    pub fn with_chooser(
        config: Config,
        grammar: Grammar,
        chooser: C,
        executor: Arc<dyn Executor>,
        stop: StopToken,
    ) -> Self {
        let grammar = Arc::new(grammar);
        let coverage = Arc::new(GrammarCoverage::new(&grammar));

        Self {
            config,
            grammar,
            chooser,
            coverage,
            responses: Arc::new(ResponseCoverage::new()),
            executor,
            stop,
        }
    }

    /// The shared grammar-coverage tracker of this session.
    pub fn coverage(&self) -> &GrammarCoverage {
        &self.coverage
    }

    pub fn stats(&self) -> CoverageStats {
        self.coverage.stats()
    }

    /// Clear coverage so a fresh session can be run with the same grammar.
    pub fn reset(&self) {
        self.coverage.reset();
        self.responses.reset();
    }
}

impl<C: ChooseExpansion + Copy + Send + Sync> Fuzzer for CoverageGuidedFuzzer<C> {
    fn run(&mut self) -> Result<Report, Error> {
        let base_seed = self.config.session_seed();
        let limit = u64::from(self.config.num_requests);

        let issued = AtomicU64::new(0);
        let requests = AtomicU64::new(0);
        let errors = AtomicU64::new(0);
        let interesting = Mutex::new(Vec::new());

        info!(
            workers = self.config.concurrency,
            requests = limit,
            "starting grammar fuzzing session"
        );

        std::thread::scope(|scope| {
            for worker in 0..self.config.concurrency {
                let mut generator = GrammarGenerator::new(
                    Arc::clone(&self.grammar),
                    Arc::clone(&self.coverage),
                    self.chooser,
                    self.config.max_depth,
                    StdRng::seed_from_u64(base_seed.wrapping_add(u64::from(worker))),
                );
                let coverage = Arc::clone(&self.coverage);
                let responses = Arc::clone(&self.responses);
                let executor = Arc::clone(&self.executor);
                let stop = self.stop.clone();
                let issued = &issued;
                let requests = &requests;
                let errors = &errors;
                let interesting = &interesting;

                scope.spawn(move || {
                    while !stop.is_stopped() && claim_request(issued, limit) {
                        let tree = generator.generate();
                        coverage.insert_tree(&tree);
                        let input = tree.leaf_string();

                        requests.fetch_add(1, Ordering::Relaxed);
                        match executor.execute(&input) {
                            Ok(response) => {
                                let status = response.status();
                                if responses.track(&response) {
                                    debug!(status, url = response.url(), "new response coverage");
                                    interesting.lock().unwrap().push(input);
                                } else {
                                    debug!(status, url = response.url(), "response");
                                }
                            },
                            Err(err) => {
                                errors.fetch_add(1, Ordering::Relaxed);
                                debug!(error = %err, input = input.as_str(), "request failed");
                            },
                        }
                    }
                });
            }
        });

        let report = Report {
            requests: requests.load(Ordering::Relaxed),
            transport_errors: errors.load(Ordering::Relaxed),
            grammar_coverage: Some(self.coverage.stats()),
            response_coverage: Some(self.responses.stats()),
            interesting: interesting.into_inner().unwrap(),
        };

        info!(
            requests = report.requests,
            errors = report.transport_errors,
            "grammar fuzzing session finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{FailingExecutor, StaticExecutor};
    use indexmap::IndexMap;

    fn digits() -> Grammar {
        let mut rules = IndexMap::new();
        rules.insert("<start>".to_string(), vec!["/d/ <d>".to_string()]);
        rules.insert("<d>".to_string(), vec!["0".to_string(), "1".to_string()]);
        Grammar::new(rules)
    }

    fn config(requests: u32, workers: u32) -> Config {
        let mut config = Config::new("http://h/");
        config.num_requests = requests;
        config.concurrency = workers;
        config.rng_seed = Some(7);
        config
    }

    #[test]
    fn test_session_issues_all_requests() {
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });
        let mut fuzzer =
            GrammarCoverageFuzzer::new(config(8, 2), digits(), executor, StopToken::new());

        let report = fuzzer.run().unwrap();

        assert_eq!(report.requests, 8);
        assert_eq!(report.transport_errors, 0);
        let stats = report.grammar_coverage.unwrap();
        assert_eq!(stats.total_expansions, 3);
        // Eight runs over a three-production grammar cover everything
        assert_eq!(stats.covered_expansions, 3);
    }

    #[test]
    fn test_systematic_session_covers_grammar() {
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });
        let mut fuzzer =
            SystematicCoverageFuzzer::new(config(2, 1), digits(), executor, StopToken::new());

        let report = fuzzer.run().unwrap();
        let stats = report.grammar_coverage.unwrap();
        assert_eq!(stats.covered_expansions, stats.total_expansions);
        assert!((stats.coverage_percentage - 100.0).abs() < 1e-9);
        assert_eq!(report.requests, 2);
    }

    #[test]
    fn test_transport_errors_are_recorded_and_skipped() {
        let mut fuzzer = GrammarCoverageFuzzer::new(
            config(5, 1),
            digits(),
            Arc::new(FailingExecutor),
            StopToken::new(),
        );

        let report = fuzzer.run().unwrap();
        assert_eq!(report.requests, 5);
        assert_eq!(report.transport_errors, 5);
        assert!(report.interesting.is_empty());
    }

    #[test]
    fn test_stop_token_halts_the_session() {
        let stop = StopToken::new();
        stop.stop();
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });
        let mut fuzzer = GrammarCoverageFuzzer::new(config(100, 4), digits(), executor, stop);

        let report = fuzzer.run().unwrap();
        assert_eq!(report.requests, 0);
    }

    #[test]
    fn test_reset_clears_coverage() {
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });
        let mut fuzzer =
            GrammarCoverageFuzzer::new(config(4, 1), digits(), executor, StopToken::new());

        fuzzer.run().unwrap();
        assert!(fuzzer.stats().covered_expansions > 0);

        fuzzer.reset();
        assert_eq!(fuzzer.stats().covered_expansions, 0);
    }
}

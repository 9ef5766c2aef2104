//! Fuzzing sessions: configuration, the common [`Fuzzer`] trait and the
//! factory that assembles a session from a [`Config`].

mod grammar_coverage;
mod mutation;
mod mutation_coverage;
mod payload;

pub use grammar_coverage::*;
pub use mutation::*;
pub use mutation_coverage::*;
pub use payload::*;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::{
    coverage::{CoverageStats, ResponseStats},
    error::{ConfigError, Error},
    grammar::Grammar,
    http::{Executor, HttpExecutor},
};

/// Which fuzzing loop a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Iterate the built-in payload list against the target.
    Payload,
    /// Coverage-weighted grammar generation.
    #[default]
    GrammarCoverage,
    /// Systematic (breadth-first) grammar generation.
    Systematic,
    /// Plain mutation of seed URLs.
    Mutation,
    /// Energy-scheduled mutation of seed URLs.
    MutationCoverage,
}

/// Configuration of one fuzzing session.
#[derive(Debug, Clone)]
pub struct Config {
    pub target_url: String,
    pub mode: Mode,
    /// Worker count, between 1 and 100.
    pub concurrency: u32,
    /// Total requests per session.
    pub num_requests: u32,
    /// Per-request wall-clock bound, at least one second.
    pub timeout: Duration,
    /// Generator depth bound.
    pub max_depth: u32,
    /// Population cap for the mutation scheduler, 0 disables pruning.
    pub max_corpus: u32,
    pub min_mutations: u32,
    pub max_mutations: u32,
    /// Initial population for the mutation loops.
    pub seed_inputs: Vec<String>,
    /// Extra payloads for the payload fuzzer, one per line.
    pub wordlist: Option<PathBuf>,
    /// Seed for all per-worker RNGs; drawn from entropy when absent.
    pub rng_seed: Option<u64>,
}

impl Config {
    /// A config with the default knobs for `target_url`.
    pub fn new<S: Into<String>>(target_url: S) -> Self {
        Self {
            target_url: target_url.into(),
            mode: Mode::default(),
            concurrency: 20,
            num_requests: 2000,
            timeout: Duration::from_secs(10),
            max_depth: 10,
            max_corpus: 2000,
            min_mutations: 1,
            max_mutations: 5,
            seed_inputs: Vec::new(),
            wordlist: None,
            rng_seed: None,
        }
    }

    /// Check that all options are within their allowed ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_url.is_empty() {
            return Err(ConfigError::MissingTarget);
        }
        if !(1..=100).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }
        if self.num_requests == 0 {
            return Err(ConfigError::InvalidNumRequests);
        }
        if self.timeout < Duration::from_secs(1) {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth);
        }
        if self.min_mutations > self.max_mutations {
            return Err(ConfigError::InvalidMutationBounds(
                self.min_mutations,
                self.max_mutations,
            ));
        }
        Ok(())
    }

    /// The base RNG seed of this session. Worker `i` derives its own RNG from
    /// `base + i`.
    pub(crate) fn session_seed(&self) -> u64 {
        self.rng_seed.unwrap_or_else(rand::random)
    }
}

/// Cooperative stop signal shared by all workers of a session. Workers check
/// it at loop heads; outstanding requests complete or time out on their own.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    /// Requests attempted, including failed ones.
    pub requests: u64,
    /// Requests that failed with a transport error.
    pub transport_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grammar_coverage: Option<CoverageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_coverage: Option<ResponseStats>,
    /// Inputs that reached new coverage, in discovery order.
    pub interesting: Vec<String>,
}

/// A fuzzing session. Implementations differ in how they produce inputs; all
/// of them issue up to `num_requests` requests and report what they observed.
pub trait Fuzzer {
    fn run(&mut self) -> Result<Report, Error>;
}

/// Assemble the fuzzer selected by `config.mode` against a live HTTP
/// executor.
///
/// Grammar-driven modes require `grammar`; mutation modes require at least
/// one seed input.
pub fn create(
    config: Config,
    grammar: Option<Grammar>,
    stop: StopToken,
) -> Result<Box<dyn Fuzzer>, Error> {
    config.validate()?;
    let executor: Arc<dyn Executor> =
        Arc::new(HttpExecutor::new(&config.target_url, config.timeout)?);
    create_with_executor(config, grammar, stop, executor)
}

/// Like [`create`], with a caller-supplied executor.
pub fn create_with_executor(
    config: Config,
    grammar: Option<Grammar>,
    stop: StopToken,
    executor: Arc<dyn Executor>,
) -> Result<Box<dyn Fuzzer>, Error> {
    config.validate()?;

    let require_grammar = || {
        grammar
            .clone()
            .ok_or_else(|| Error::Input("grammar-driven fuzzing requires a grammar".to_string()))
    };

    match config.mode {
        Mode::Payload => Ok(Box::new(PayloadFuzzer::new(config, executor, stop)?)),
        Mode::GrammarCoverage => Ok(Box::new(GrammarCoverageFuzzer::new(
            config,
            require_grammar()?,
            executor,
            stop,
        ))),
        Mode::Systematic => Ok(Box::new(SystematicCoverageFuzzer::new(
            config,
            require_grammar()?,
            executor,
            stop,
        ))),
        Mode::Mutation => Ok(Box::new(MutationFuzzer::new(config, executor, stop)?)),
        Mode::MutationCoverage => Ok(Box::new(MutationCoverageFuzzer::new(
            config, executor, stop,
        )?)),
    }
}

/// Hand out loop iterations until `limit` is reached.
pub(crate) fn claim_request(counter: &AtomicU64, limit: u64) -> bool {
    counter.fetch_add(1, Ordering::Relaxed) < limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::StaticExecutor;

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::new("http://h/");
        assert!(config.validate().is_ok());

        config.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConcurrency(0))
        ));
        config.concurrency = 101;
        assert!(config.validate().is_err());
        config.concurrency = 100;
        assert!(config.validate().is_ok());

        config.num_requests = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNumRequests)
        ));
        config.num_requests = 1;

        config.timeout = Duration::from_millis(500);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout)));
        config.timeout = Duration::from_secs(1);

        config.max_depth = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMaxDepth)));
        config.max_depth = 1;

        config.min_mutations = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMutationBounds(6, 5))
        ));
        config.min_mutations = 1;

        config.target_url = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingTarget)));
    }

    #[test]
    fn test_factory_requires_grammar_for_grammar_modes() {
        let config = Config::new("http://h/");
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });

        let result = create_with_executor(config, None, StopToken::new(), executor);
        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[test]
    fn test_factory_requires_seeds_for_mutation_modes() {
        let mut config = Config::new("http://h/");
        config.mode = Mode::MutationCoverage;
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });

        let result = create_with_executor(config, None, StopToken::new(), executor);
        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[test]
    fn test_stop_token() {
        let stop = StopToken::new();
        assert!(!stop.is_stopped());
        let clone = stop.clone();
        clone.stop();
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_claim_request_hands_out_exactly_limit() {
        let counter = AtomicU64::new(0);
        let mut claimed = 0;
        for _ in 0..10 {
            if claim_request(&counter, 4) {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 4);
    }
}

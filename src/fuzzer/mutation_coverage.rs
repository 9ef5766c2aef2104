use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

use crate::{
    coverage::ResponseCoverage,
    error::Error,
    fuzzer::{claim_request, Config, Fuzzer, Report, StopToken},
    http::Executor,
    mutation::{MutationScheduler, UrlMutator},
};

/// Energy-scheduled mutation session: parents are drawn from the population
/// by roulette wheel, mutants that reach a new coverage fingerprint are
/// admitted with high energy, everything else decays its parent. The
/// population is pruned back to the corpus cap after every test.
pub struct MutationCoverageFuzzer {
    config: Config,
    scheduler: Arc<MutationScheduler>,
    responses: Arc<ResponseCoverage>,
    executor: Arc<dyn Executor>,
    stop: StopToken,
}

impl MutationCoverageFuzzer {
    pub fn new(config: Config, executor: Arc<dyn Executor>, stop: StopToken) -> Result<Self, Error> {
        if config.seed_inputs.is_empty() {
            return Err(Error::Input(
                "at least one seed input is required".to_string(),
            ));
        }

        let scheduler = Arc::new(MutationScheduler::new(
            config.seed_inputs.clone(),
            config.max_corpus as usize,
        ));

        Ok(Self {
            config,
            scheduler,
            responses: Arc::new(ResponseCoverage::new()),
            executor,
            stop,
        })
    }

    /// The energy-weighted population shared by this session's workers.
    pub fn scheduler(&self) -> &MutationScheduler {
        &self.scheduler
    }
}

impl Fuzzer for MutationCoverageFuzzer {
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
            corpus_cap = self.config.max_corpus,
            "starting mutation-coverage fuzzing session"
        );

        std::thread::scope(|scope| {
            for worker in 0..self.config.concurrency {
                let worker_seed = base_seed.wrapping_add(u64::from(worker));
                let mut rng = StdRng::seed_from_u64(worker_seed);
                let mut mutator = UrlMutator::new(StdRng::seed_from_u64(worker_seed ^ 0x6d75_7461_7465));
                let scheduler = Arc::clone(&self.scheduler);
                let responses = Arc::clone(&self.responses);
                let executor = Arc::clone(&self.executor);
                let stop = self.stop.clone();
                let config = &self.config;
                let issued = &issued;
                let requests = &requests;
                let errors = &errors;
                let interesting = &interesting;

                scope.spawn(move || {
                    while !stop.is_stopped() && claim_request(issued, limit) {
                        let parent = scheduler.select(&mut rng);

                        let rounds = rng.gen_range(config.min_mutations..=config.max_mutations);
                        let mut mutant = parent.clone();
                        for _ in 0..rounds {
                            mutant = mutator.mutate(&mutant);
                        }

                        requests.fetch_add(1, Ordering::Relaxed);
                        match executor.execute(&mutant) {
                            Ok(response) => {
                                responses.track(&response);
                                let fingerprint = response.coverage_fingerprint();
                                if scheduler.record(&parent, &mutant, &fingerprint) {
                                    debug!(fingerprint = fingerprint.as_str(), input = mutant.as_str(), "new coverage");
                                    interesting.lock().unwrap().push(mutant);
                                }
                            },
                            Err(err) => {
                                errors.fetch_add(1, Ordering::Relaxed);
                                debug!(error = %err, input = mutant.as_str(), "request failed");
                            },
                        }
                    }
                });
            }
        });

        let report = Report {
            requests: requests.load(Ordering::Relaxed),
            transport_errors: errors.load(Ordering::Relaxed),
            grammar_coverage: None,
            response_coverage: Some(self.responses.stats()),
            interesting: interesting.into_inner().unwrap(),
        };

        info!(
            requests = report.requests,
            population = self.scheduler.len(),
            total_energy = self.scheduler.total_energy(),
            "mutation-coverage fuzzing session finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{CountingExecutor, StaticExecutor};
    use crate::mutation::NEW_COVERAGE_ENERGY;

    fn config(requests: u32, max_corpus: u32) -> Config {
        let mut config = Config::new("http://h/");
        config.mode = crate::fuzzer::Mode::MutationCoverage;
        config.num_requests = requests;
        config.concurrency = 1;
        config.max_corpus = max_corpus;
        config.seed_inputs = vec!["http://h/a".to_string()];
        config.rng_seed = Some(5);
        config
    }

    #[test]
    fn test_requires_seeds() {
        let mut config = config(1, 0);
        config.seed_inputs.clear();
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });

        assert!(matches!(
            MutationCoverageFuzzer::new(config, executor, StopToken::new()),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn test_new_coverage_mutants_displace_the_seed() {
        let mut fuzzer = MutationCoverageFuzzer::new(
            config(3, 2),
            Arc::new(CountingExecutor::default()),
            StopToken::new(),
        )
        .unwrap();

        let report = fuzzer.run().unwrap();

        // Three mutants, each with a fresh fingerprint: the population is
        // pruned to the cap and only high-energy entries remain
        assert_eq!(report.requests, 3);
        assert_eq!(report.interesting.len(), 3);

        let scheduler = fuzzer.scheduler();
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.total_energy(), 2 * NEW_COVERAGE_ENERGY);
        for input in scheduler.population() {
            assert_eq!(scheduler.energy(&input), Some(NEW_COVERAGE_ENERGY));
        }
        // The first two accepted mutants survive the tie-break
        assert_eq!(scheduler.population(), report.interesting[..2].to_vec());
    }

    #[test]
    fn test_known_coverage_decays_the_parent() {
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"same",
        });
        let mut fuzzer =
            MutationCoverageFuzzer::new(config(8, 0), executor, StopToken::new()).unwrap();

        let report = fuzzer.run().unwrap();

        assert_eq!(report.requests, 8);
        // Only the very first fingerprint is new
        assert_eq!(report.interesting.len(), 1);
        let scheduler = fuzzer.scheduler();
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.seen_fingerprints(), 1);
        assert_eq!(
            scheduler.total_energy(),
            scheduler
                .population()
                .iter()
                .map(|input| scheduler.energy(input).unwrap())
                .sum::<u32>()
        );
    }
}

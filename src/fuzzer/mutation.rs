use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashSet as HashSet;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

use crate::{
    error::Error,
    fuzzer::{claim_request, Config, Fuzzer, Report, StopToken},
    http::Executor,
    mutation::UrlMutator,
};

/// Plain mutation session: pick a seed uniformly from the pool, apply a
/// random number of mutation operators, execute, and grow the pool with
/// inputs whose response fingerprint was not seen before.
pub struct MutationFuzzer {
    config: Config,
    pool: Mutex<Vec<String>>,
    seen: Mutex<HashSet<String>>,
    executor: Arc<dyn Executor>,
    stop: StopToken,
}

impl MutationFuzzer {
    pub fn new(config: Config, executor: Arc<dyn Executor>, stop: StopToken) -> Result<Self, Error> {
        if config.seed_inputs.is_empty() {
            return Err(Error::Input(
                "at least one seed input is required".to_string(),
            ));
        }

        Ok(Self {
            pool: Mutex::new(config.seed_inputs.clone()),
            config,
            seen: Mutex::new(HashSet::new()),
            executor,
            stop,
        })
    }

    /// Current pool of inputs, seeds first.
    pub fn pool(&self) -> Vec<String> {
        self.pool.lock().unwrap().clone()
    }
}

impl Fuzzer for MutationFuzzer {
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
            "starting mutation fuzzing session"
        );

        std::thread::scope(|scope| {
            for worker in 0..self.config.concurrency {
                let worker_seed = base_seed.wrapping_add(u64::from(worker));
                let mut rng = StdRng::seed_from_u64(worker_seed);
                let mut mutator = UrlMutator::new(StdRng::seed_from_u64(worker_seed ^ 0x6d75_7461_7465));
                let executor = Arc::clone(&self.executor);
                let stop = self.stop.clone();
                let pool = &self.pool;
                let seen = &self.seen;
                let config = &self.config;
                let issued = &issued;
                let requests = &requests;
                let errors = &errors;
                let interesting = &interesting;

                scope.spawn(move || {
                    while !stop.is_stopped() && claim_request(issued, limit) {
                        let input = {
                            let pool = pool.lock().unwrap();
                            pool[rng.gen_range(0..pool.len())].clone()
                        };

                        let rounds = rng.gen_range(config.min_mutations..=config.max_mutations);
                        let mut mutated = input;
                        for _ in 0..rounds {
                            mutated = mutator.mutate(&mutated);
                        }

                        requests.fetch_add(1, Ordering::Relaxed);
                        match executor.execute(&mutated) {
                            Ok(response) => {
                                let fingerprint = response.coverage_fingerprint();
                                let is_new = seen.lock().unwrap().insert(fingerprint.clone());
                                if is_new {
                                    debug!(fingerprint = fingerprint.as_str(), input = mutated.as_str(), "new coverage");
                                    pool.lock().unwrap().push(mutated.clone());
                                    interesting.lock().unwrap().push(mutated);
                                }
                            },
                            Err(err) => {
                                errors.fetch_add(1, Ordering::Relaxed);
                                debug!(error = %err, input = mutated.as_str(), "request failed");
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
            response_coverage: None,
            interesting: interesting.into_inner().unwrap(),
        };

        info!(
            requests = report.requests,
            pool = self.pool.lock().unwrap().len(),
            "mutation fuzzing session finished"
        );

        Ok(report)
    }
}

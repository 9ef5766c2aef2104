//! Energy-weighted corpus scheduling for the mutation loop.

use std::sync::Mutex;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use rand::{rngs::StdRng, Rng};

/// Energy granted to a mutant that uncovered a new fingerprint.
pub const NEW_COVERAGE_ENERGY: u32 = 10;

/// Baseline energy for freshly added entries and decayed parents.
pub const BASE_ENERGY: u32 = 1;

#[derive(Debug, Default)]
struct State {
    population: Vec<String>,
    energies: HashMap<String, u32>,
    total_energy: u32,
    seen_coverage: HashSet<String>,
}

impl State {
    fn add(&mut self, input: &str) {
        self.population.push(input.to_string());
        self.energies.insert(input.to_string(), BASE_ENERGY);
        self.total_energy += BASE_ENERGY;
    }

    fn assign_energy(&mut self, input: &str, energy: u32) {
        // Inputs pruned by a concurrent worker no longer take part
        let Some(current) = self.energies.get_mut(input) else {
            return;
        };
        self.total_energy = self.total_energy + energy - *current;
        *current = energy;
    }

    fn prune(&mut self, max_population: usize) {
        if max_population == 0 || self.population.len() <= max_population {
            return;
        }

        let population = std::mem::take(&mut self.population);
        let mut entries: Vec<(String, u32)> = population
            .into_iter()
            .map(|input| {
                let energy = self.energies.get(&input).copied().unwrap_or(0);
                (input, energy)
            })
            .collect();

        // Stable sort: equal energies keep their insertion order
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(max_population);

        let mut energies = HashMap::with_capacity(entries.len());
        let mut total_energy = 0;
        for (input, energy) in &entries {
            total_energy += energy;
            energies.insert(input.clone(), *energy);
        }

        self.population = entries.into_iter().map(|(input, _)| input).collect();
        self.energies = energies;
        self.total_energy = total_energy;
    }
}

/// Maintains the mutation corpus: an energy-weighted population selected by
/// roulette wheel, bounded by a population cap.
///
/// Population, energies, total energy and the seen-fingerprint set live under
/// a single mutex and are only ever mutated as a group, which keeps
/// `total_energy` equal to the sum of the population's energies.
#[derive(Debug)]
pub struct MutationScheduler {
    seeds: Vec<String>,
    max_population: usize,
    state: Mutex<State>,
}

impl MutationScheduler {
    /// Create a scheduler whose population starts out as `seeds`.
    /// `max_population == 0` disables pruning.
    pub fn new(seeds: Vec<String>, max_population: usize) -> Self {
        let mut state = State::default();
        for seed in &seeds {
            state.add(seed);
        }

        Self {
            seeds,
            max_population,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Append an input to the population with baseline energy.
    pub fn add(&self, input: &str) {
        self.lock().add(input);
    }

    /// Roulette-wheel selection proportional to energy: iterate the
    /// population in order and return the first entry whose running energy
    /// sum exceeds a uniformly drawn point.
    pub fn select(&self, rng: &mut StdRng) -> String {
        let state = self.lock();

        if state.population.is_empty() || state.total_energy == 0 {
            return self.seeds.first().cloned().unwrap_or_default();
        }

        let point = rng.gen_range(0..state.total_energy);
        let mut sum = 0;
        for input in &state.population {
            sum += state.energies.get(input).copied().unwrap_or(0);
            if sum > point {
                return input.clone();
            }
        }

        // Numerical corner case: fall back to the last entry
        state.population.last().cloned().unwrap_or_default()
    }

    /// Set an input's energy, keeping the total consistent.
    pub fn assign_energy(&self, input: &str, energy: u32) {
        self.lock().assign_energy(input, energy);
    }

    /// Record the outcome of one tested mutant: a new fingerprint admits the
    /// mutant with high energy, a known one decays the parent to baseline.
    /// Pruning runs afterwards either way. Returns true when the fingerprint
    /// was new.
    pub fn record(&self, parent: &str, mutant: &str, fingerprint: &str) -> bool {
        let mut state = self.lock();

        let is_new = state.seen_coverage.insert(fingerprint.to_string());
        if is_new {
            state.add(mutant);
            state.assign_energy(mutant, NEW_COVERAGE_ENERGY);
        } else {
            state.assign_energy(parent, BASE_ENERGY);
        }

        state.prune(self.max_population);

        is_new
    }

    /// Trim the population down to the cap, keeping the highest-energy
    /// entries.
    pub fn prune(&self) {
        self.lock().prune(self.max_population);
    }

    pub fn population(&self) -> Vec<String> {
        self.lock().population.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().population.is_empty()
    }

    pub fn total_energy(&self) -> u32 {
        self.lock().total_energy
    }

    pub fn energy(&self, input: &str) -> Option<u32> {
        self.lock().energies.get(input).copied()
    }

    /// Number of distinct coverage fingerprints seen so far.
    pub fn seen_fingerprints(&self) -> usize {
        self.lock().seen_coverage.len()
    }
}

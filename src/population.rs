//! Genetic trainer: a fixed-capacity population of networks evolved by
//! fitness-proportional mating and mutation.

use crate::align::AlignedMatrix;
use crate::config::Config;
use crate::error::Error;
use crate::layer::Init;
use crate::network::Network;
use crate::random::Randomizer;
use crate::real::Real;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Error assigned to individuals that have never been evaluated
const UNEVALUATED: f64 = 1e10;

/// One population slot: a network and its last measured error
pub struct Individual<T: Real> {
    pub error: f64,
    pub net: Network<T>,
}

/// Fixed-capacity population. Each call to [`Population::train`] runs one
/// generation: reproduce into the slots freed by the previous selection,
/// score every (new) individual in parallel, then sort ascending by error.
pub struct Population<T: Real> {
    capacity: usize,
    survival_rate: f64,
    shape: Vec<usize>,
    individuals: Vec<Individual<T>>,
    generation: u64,
    rand: Randomizer,
    pool: Option<rayon::ThreadPool>,
}

impl<T: Real> Population<T> {
    /// Create an empty population; the first `train` call fills it with
    /// randomly initialized networks
    pub fn new(capacity: usize, survival_rate: f64, shape: &[usize]) -> Result<Self, Error> {
        Self::with_seed(capacity, survival_rate, shape, rand::random())
    }

    /// Create an empty population with a fixed reproduction seed
    pub fn with_seed(
        capacity: usize,
        survival_rate: f64,
        shape: &[usize],
        seed: u64,
    ) -> Result<Self, Error> {
        if capacity < 2 {
            return Err(Error::ShapeMismatch(format!(
                "population capacity must be at least 2, got {}",
                capacity
            )));
        }
        if !(survival_rate > 0.0 && survival_rate <= 1.0) {
            return Err(Error::ShapeMismatch(format!(
                "survival rate must be in (0, 1], got {}",
                survival_rate
            )));
        }
        if shape.len() < 2 || shape.iter().any(|&w| w == 0) {
            return Err(Error::ShapeMismatch(format!(
                "network shape needs at least two positive widths, got {:?}",
                shape
            )));
        }

        Ok(Self {
            capacity,
            survival_rate,
            shape: shape.to_vec(),
            individuals: Vec::new(),
            generation: 0,
            rand: Randomizer::seeded(seed),
            pool: None,
        })
    }

    /// Create a population from a configuration, honoring the optional
    /// worker-pool size hint
    pub fn from_config(config: &Config, shape: &[usize]) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let mut population = Self::new(
            config.population.capacity,
            config.population.survival_rate,
            shape,
        )?;
        if let Some(threads) = config.threads {
            population.pool = Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()?,
            );
        }
        Ok(population)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Individuals kept after each selection
    #[inline]
    pub fn survivor_count(&self) -> usize {
        ((self.capacity as f64 * self.survival_rate).floor() as usize).clamp(1, self.capacity)
    }

    /// Completed generations
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current individuals, sorted ascending by error after each `train`
    pub fn individuals(&self) -> &[Individual<T>] {
        &self.individuals
    }

    /// The best individual so far, if any generation has run
    pub fn best(&self) -> Option<&Individual<T>> {
        self.individuals.first()
    }

    /// Run one generation: Populate, Evaluate, Select. Returns the best
    /// error of the generation. With `static_inputs` the survivors'
    /// scores are reused and only fresh children are evaluated.
    pub fn train(
        &mut self,
        inputs: &AlignedMatrix<T>,
        expected: &AlignedMatrix<T>,
        mutation_rate: f64,
        static_inputs: bool,
    ) -> Result<f64, Error> {
        if inputs.rows() != expected.rows() {
            return Err(Error::ShapeMismatch(format!(
                "{} input rows vs {} expected rows",
                inputs.rows(),
                expected.rows()
            )));
        }
        let (first, last) = (self.shape[0], self.shape[self.shape.len() - 1]);
        if inputs.cols() != first || expected.cols() != last {
            return Err(Error::ShapeMismatch(format!(
                "training batch {}x{} does not fit a {:?} network",
                inputs.cols(),
                expected.cols(),
                self.shape
            )));
        }

        let initial = self.individuals.is_empty();
        self.populate(mutation_rate)?;
        self.evaluate(inputs, expected, initial || !static_inputs)?;
        self.select();

        let best = self.individuals[0].error;
        log::debug!(
            "generation {}: best error {:.6}, survivors {}",
            self.generation,
            best,
            self.survivor_count()
        );
        self.generation += 1;
        Ok(best)
    }

    /// Fill the free slots. The first generation creates every individual
    /// from scratch; later generations breed children from the survivors
    /// of the previous selection.
    fn populate(&mut self, mutation_rate: f64) -> Result<(), Error> {
        if self.individuals.is_empty() {
            self.individuals.reserve_exact(self.capacity);
            for _ in 0..self.capacity {
                let net = Network::new(&self.shape, Init::Evolution, &mut self.rand)?;
                self.individuals.push(Individual {
                    error: UNEVALUATED,
                    net,
                });
            }
            return Ok(());
        }

        let survivors = self.survivor_count();
        let children = self.capacity - survivors;
        if children == 0 {
            return Ok(());
        }

        let errors: Vec<f64> = self.individuals[..survivors]
            .iter()
            .map(|ind| ind.error)
            .collect();
        let counts = allocate_pair_counts(&errors, children);

        let mut slot = survivors;
        for (i, j, count) in counts {
            for _ in 0..count {
                let mut child = Network::crossover(
                    &self.individuals[i].net,
                    &self.individuals[j].net,
                    &mut self.rand,
                )?;
                child.mutate(mutation_rate, &mut self.rand);
                self.individuals[slot] = Individual {
                    error: UNEVALUATED,
                    net: child,
                };
                slot += 1;
            }
        }
        debug_assert_eq!(slot, self.capacity);
        Ok(())
    }

    /// Score individuals in parallel. Each worker keeps one scratch output
    /// matrix and writes only its own individual's error field.
    fn evaluate(
        &mut self,
        inputs: &AlignedMatrix<T>,
        expected: &AlignedMatrix<T>,
        all: bool,
    ) -> Result<(), Error> {
        let start = if all { 0 } else { self.survivor_count() };
        let rows = inputs.rows();
        let out_cols = expected.cols();

        let pool = self.pool.as_ref();
        let slice = &mut self.individuals[start..];
        let mut run = || {
            slice.par_iter_mut().try_for_each_init(
                || AlignedMatrix::zeroed(rows, out_cols),
                |scratch, ind| {
                    ind.net.batch_forward(inputs, scratch)?;
                    ind.error = ind.net.error(scratch, expected)?;
                    Ok(())
                },
            )
        };

        match pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Stable sort ascending by error; the head becomes the reported best
    fn select(&mut self) {
        self.individuals
            .sort_by(|a, b| a.error.partial_cmp(&b.error).unwrap_or(Ordering::Equal));
    }
}

/// Apportion `children` across all unordered survivor pairs `(i, j)`,
/// proportionally to the pair's success `2*max_err - err[i] - err[j]`
/// over `total_pairs_success = (survivors - 1) * (survivors * max_err -
/// total_err)`. Fractional remainders carry across pairs in ascending
/// `(i, j)` order; an extra child is emitted whenever the carry reaches
/// one, so the counts always sum to exactly `children`.
fn allocate_pair_counts(errors: &[f64], children: usize) -> Vec<(usize, usize, usize)> {
    let survivors = errors.len();
    if survivors == 1 {
        // a lone survivor breeds with itself: mutated clones
        return vec![(0, 0, children)];
    }

    let max_err = errors.iter().cloned().fold(f64::MIN, f64::max);
    let total_err: f64 = errors.iter().sum();
    let total_success = survivors as f64 * max_err - total_err;

    if total_success <= 0.0 {
        // all survivors scored identically; spread children evenly
        return round_robin_counts(survivors, children);
    }

    let total_pairs_success = (survivors - 1) as f64 * total_success;
    let mut counts = Vec::new();
    let mut produced = 0usize;
    let mut carry = 0.0;

    for i in 0..survivors {
        for j in i + 1..survivors {
            let pair_success = 2.0 * max_err - errors[i] - errors[j];
            let share = pair_success / total_pairs_success * children as f64 + carry;
            let mut count = share.floor() as usize;
            carry = share - count as f64;

            if produced + count > children {
                count = children - produced;
            }
            produced += count;
            if count > 0 {
                counts.push((i, j, count));
            }
        }
    }

    // floating-point shortfall goes to the best pair
    if produced < children {
        counts.push((0, 1, children - produced));
    }
    counts
}

/// One child per pair in ascending order, wrapping until the budget is
/// spent
fn round_robin_counts(survivors: usize, children: usize) -> Vec<(usize, usize, usize)> {
    let pairs: Vec<(usize, usize)> = (0..survivors)
        .flat_map(|i| (i + 1..survivors).map(move |j| (i, j)))
        .collect();
    let base = children / pairs.len();
    let extra = children % pairs.len();

    pairs
        .iter()
        .enumerate()
        .filter_map(|(idx, &(i, j))| {
            let count = base + usize::from(idx < extra);
            (count > 0).then_some((i, j, count))
        })
        .collect()
}

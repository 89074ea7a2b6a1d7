use crate::errors::FitError;
use crate::kernels::sorters::sort_indices_desc;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

// The seeding pool is oversampled by this factor and culled to the working
// population, to start from a reasonably fit group.
const INITIAL_POPULATION_FACTOR: usize = 5;
// Parents are drawn from this fraction of the sorted population.
const BREEDING_FRACTION: usize = 2;
// Mutation perturbs a gene by up to this fraction of its bound width.
const MUTATION_SPAN: f64 = 0.1;

/// Configuration of the genetic optimizer, validated at construction of
/// `FitGA`.
///
/// The crossover weight may exceed 1: after a few generations the
/// population starts to converge, and a widened random weight lets children
/// extrapolate slightly beyond the parent pair, which works against
/// inbreeding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Members carried unchanged into the next generation.
    pub elite_count: usize,
    /// Children mutated per generation, exactly.
    pub mutation_count: usize,
    /// Upper limit of the random crossover weight.
    pub crossover_weight: f64,
    /// Seed for the pRNG; `None` seeds from the OS. Two runs with the same
    /// seed, fitness and bounds produce identical results.
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 40,
            generations: 100,
            elite_count: 3,
            mutation_count: 12,
            crossover_weight: 1.49,
            seed: None,
        }
    }
}

impl GaConfig {
    #[must_use]
    pub fn with_population_size(self, population_size: usize) -> Self {
        Self {
            population_size,
            ..self
        }
    }

    #[must_use]
    pub fn with_generations(self, generations: usize) -> Self {
        Self {
            generations,
            ..self
        }
    }

    #[must_use]
    pub fn with_elite_count(self, elite_count: usize) -> Self {
        Self {
            elite_count,
            ..self
        }
    }

    #[must_use]
    pub fn with_mutation_count(self, mutation_count: usize) -> Self {
        Self {
            mutation_count,
            ..self
        }
    }

    #[must_use]
    pub fn with_crossover_weight(self, crossover_weight: f64) -> Self {
        Self {
            crossover_weight,
            ..self
        }
    }

    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.population_size < 2 {
            return Err(FitError::invalid_argument(format!(
                "population_size must be at least 2, got {}",
                self.population_size
            )));
        }
        if self.generations == 0 {
            return Err(FitError::invalid_argument("generations must be positive"));
        }
        if self.elite_count == 0 || self.elite_count >= self.population_size {
            return Err(FitError::invalid_argument(format!(
                "elite_count {} must be in [1, population_size)",
                self.elite_count
            )));
        }
        if self.mutation_count > self.population_size - self.elite_count {
            return Err(FitError::invalid_argument(format!(
                "mutation_count {} exceeds the {} non-elite members",
                self.mutation_count,
                self.population_size - self.elite_count
            )));
        }
        if !self.crossover_weight.is_finite() || self.crossover_weight <= 0.0 {
            return Err(FitError::invalid_argument(format!(
                "crossover_weight must be positive, got {}",
                self.crossover_weight
            )));
        }
        Ok(())
    }
}

/// Outcome of a GA run.
#[derive(Debug, Clone)]
pub struct GaResult {
    /// Best member found across all generations.
    pub best_parameters: Vec<f64>,
    pub best_fitness: f64,
    /// Best fitness of each generation's population, in generation order.
    /// With at least one elite this sequence never decreases.
    pub best_per_generation: Vec<f64>,
}

/// Optimizes a scalar fitness function with a genetic algorithm.
///
/// No Jacobian is needed: selection, crossover and mutation only ever see
/// fitness values, so this is the fallback when the model's derivatives are
/// unavailable or untrustworthy. Fitness is maximized; pass a negated
/// chi-square to fit a model. The engine runs for the configured number of
/// generations, no early stopping.
///
/// Like the LM engine this is a unique resource and not `Clone`.
#[derive(Debug)]
pub struct FitGA {
    config: GaConfig,
}

impl FitGA {
    /// Validates the configuration and builds the optimizer.
    pub fn new(config: GaConfig) -> Result<Self, FitError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    /// Runs the search over the box given by `bounds` (one (low, high) pair
    /// per parameter) and returns the best member found.
    pub fn run<F>(&self, fitness: F, bounds: &[(f64, f64)]) -> Result<GaResult, FitError>
    where
        F: Fn(&[f64]) -> f64,
    {
        check_bounds(bounds)?;
        let cfg = &self.config;
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        // oversampled seeding pool, culled to the working population
        let pool_size = INITIAL_POPULATION_FACTOR * cfg.population_size;
        let pool: Vec<Vec<f64>> = (0..pool_size)
            .map(|_| random_member(bounds, &mut rng))
            .collect();
        let pool_scores: Vec<f64> = pool.iter().map(|m| fitness(m)).collect();
        let order = sort_indices_desc(&pool_scores)?;
        let mut population: Vec<Vec<f64>> = order
            .iter()
            .take(cfg.population_size)
            .map(|&i| pool[i].clone())
            .collect();
        let mut scores: Vec<f64> = order
            .iter()
            .take(cfg.population_size)
            .map(|&i| pool_scores[i])
            .collect();

        let mut best_parameters = population[0].clone();
        let mut best_fitness = scores[0];
        let mut best_per_generation = Vec::with_capacity(cfg.generations);
        let breeding = (cfg.population_size / BREEDING_FRACTION).max(2);

        for generation in 0..cfg.generations {
            let mut next: Vec<Vec<f64>> = population[..cfg.elite_count].to_vec();
            while next.len() < cfg.population_size {
                let p1 = rank_weighted_pick(breeding, &mut rng);
                let p2 = rank_weighted_pick(breeding, &mut rng);
                let child = crossover(
                    &population[p1],
                    &population[p2],
                    cfg.crossover_weight,
                    bounds,
                    &mut rng,
                );
                next.push(child);
            }

            let mut mutable: Vec<usize> = (cfg.elite_count..cfg.population_size).collect();
            mutable.shuffle(&mut rng);
            for &idx in mutable.iter().take(cfg.mutation_count) {
                mutate(&mut next[idx], bounds, &mut rng);
            }

            let raw_scores: Vec<f64> = next.iter().map(|m| fitness(m)).collect();
            let order = sort_indices_desc(&raw_scores)?;
            population = order.iter().map(|&i| next[i].clone()).collect();
            scores = order.iter().map(|&i| raw_scores[i]).collect();

            if scores[0] > best_fitness {
                best_fitness = scores[0];
                best_parameters = population[0].clone();
            }
            best_per_generation.push(scores[0]);
            debug!(
                "generation {:3}: best fitness {:10.3e}",
                generation, scores[0]
            );
        }

        info!(
            "GA finished after {} generations, best fitness {:.3e}",
            cfg.generations, best_fitness
        );
        Ok(GaResult {
            best_parameters,
            best_fitness,
            best_per_generation,
        })
    }
}

fn check_bounds(bounds: &[(f64, f64)]) -> Result<(), FitError> {
    if bounds.is_empty() {
        return Err(FitError::invalid_argument("parameter bounds are empty"));
    }
    for (i, (lo, hi)) in bounds.iter().enumerate() {
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(FitError::invalid_argument(format!(
                "bound {} = ({}, {}) is not a finite nonempty range",
                i, lo, hi
            )));
        }
    }
    Ok(())
}

fn random_member<R: Rng>(bounds: &[(f64, f64)], rng: &mut R) -> Vec<f64> {
    bounds
        .iter()
        .map(|(lo, hi)| rng.random_range(*lo..*hi))
        .collect()
}

/// Picks a rank in `[0, breeding)` with weight proportional to
/// `breeding - rank`, favoring fitter members.
fn rank_weighted_pick<R: Rng>(breeding: usize, rng: &mut R) -> usize {
    let total = breeding * (breeding + 1) / 2;
    let mut ticket = rng.random_range(0..total);
    for rank in 0..breeding {
        let weight = breeding - rank;
        if ticket < weight {
            return rank;
        }
        ticket -= weight;
    }
    breeding - 1
}

/// The genes are floating-point numbers, so crossover is a randomly
/// weighted sum `a*x1 + (1-a)*x2` rather than a bit exchange.
fn crossover<R: Rng>(
    parent1: &[f64],
    parent2: &[f64],
    weight_limit: f64,
    bounds: &[(f64, f64)],
    rng: &mut R,
) -> Vec<f64> {
    let a = rng.random::<f64>() * weight_limit;
    let mut child: Vec<f64> = parent1
        .iter()
        .zip(parent2.iter())
        .map(|(x1, x2)| a * x1 + (1.0 - a) * x2)
        .collect();
    clamp_into(&mut child, bounds);
    child
}

/// Perturbs a randomly chosen subset of the member's genes, each by a
/// uniform offset within `MUTATION_SPAN` of its bound width.
fn mutate<R: Rng>(member: &mut [f64], bounds: &[(f64, f64)], rng: &mut R) {
    let n_genes = member.len();
    let count = rng.random_range(1..=n_genes);
    let mut genes: Vec<usize> = (0..n_genes).collect();
    genes.shuffle(rng);
    for &g in genes.iter().take(count) {
        let (lo, hi) = bounds[g];
        let span = MUTATION_SPAN * (hi - lo);
        member[g] += span * (2.0 * rng.random::<f64>() - 1.0);
    }
    clamp_into(member, bounds);
}

fn clamp_into(member: &mut [f64], bounds: &[(f64, f64)]) {
    for (value, (lo, hi)) in member.iter_mut().zip(bounds.iter()) {
        *value = value.clamp(*lo, *hi);
    }
}

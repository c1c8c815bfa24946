//! Random sample consensus that reports why it failed.
//!
//! [`Ransac`] repeatedly fits a [`sample_consensus::Estimator`] to minimal random
//! samples of the data and keeps the model the most data agrees with. It can be
//! used through the [`Consensus`] trait like any other consensus process, or
//! through [`Ransac::fit`], which also explains a failure with an [`Error`].
//!
//! Every iteration draws its sample from its own generator, seeded in order from
//! the caller's generator. Iterations run in batches which are evaluated in
//! parallel when the `rayon` feature is on, and ties are broken by iteration
//! order, so the result only depends on the seed.

use log::*;
use rand::{seq::index, RngCore, SeedableRng};
use rand_pcg::Pcg64;
use sample_consensus::{Consensus, Estimator, Model};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("found {found} correspondences, at least {required} are needed to fit a model")]
    InsufficientData { found: usize, required: usize },
    #[error("the best model had {best} inliers after {iterations} iterations, {required} are required")]
    NoConsensus {
        best: usize,
        required: usize,
        iterations: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Data with a residual strictly below this is an inlier of a model.
    pub inlier_threshold: f64,
    /// Upper bound on the number of hypotheses.
    pub max_iterations: usize,
    /// When set, stop once a model with this probability of being outlier free has been seen.
    pub confidence: Option<f64>,
    /// Fewest inliers an acceptable model may have. Never less than the estimator's minimal sample.
    pub min_inliers: usize,
    /// How many times a degenerate sample is redrawn before the iteration is given up.
    pub max_degenerate_retries: usize,
    /// Hypotheses evaluated together between stopping checks.
    pub batch_size: usize,
}

impl Config {
    /// The default configuration with the given inlier threshold.
    pub fn new(inlier_threshold: f64) -> Self {
        Self {
            inlier_threshold,
            ..Default::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inlier_threshold: 3.0,
            max_iterations: 1000,
            confidence: Some(0.999),
            min_inliers: 3,
            max_degenerate_retries: 10,
            batch_size: 64,
        }
    }
}

/// A model together with the data that agrees with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fit<M> {
    pub model: M,
    /// Indices of the inliers, ascending. Every one has a residual below the threshold.
    pub inliers: Vec<usize>,
    /// Number of hypotheses evaluated.
    pub iterations: usize,
}

/// The best hypothesis of an iteration or a batch.
struct Candidate<M> {
    iteration: usize,
    model: M,
    inliers: usize,
}

impl<M> Candidate<M> {
    /// More inliers win, then the earlier iteration.
    fn better_than(&self, other: &Self) -> bool {
        self.inliers > other.inliers
            || (self.inliers == other.inliers && self.iteration < other.iteration)
    }
}

fn better<M>(a: Option<Candidate<M>>, b: Option<Candidate<M>>) -> Option<Candidate<M>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.better_than(&a) { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Number of iterations needed to draw an outlier free sample of `sample_size`
/// with probability `confidence` when a fraction `inlier_ratio` of the data are inliers.
pub fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    let w_n = inlier_ratio.powi(sample_size as i32);
    if w_n >= 1.0 {
        return 1;
    }
    if w_n <= 0.0 {
        return usize::MAX;
    }
    let log_conf = (1.0 - confidence).ln();
    let log_outlier = (1.0 - w_n).ln();
    let iterations = (log_conf / log_outlier).ceil();
    if iterations.is_finite() && iterations >= 1.0 {
        iterations as usize
    } else {
        1
    }
}

/// RANSAC driven by a caller supplied random number generator.
#[derive(Debug, Clone)]
pub struct Ransac<R> {
    pub config: Config,
    rng: R,
}

impl<R: RngCore> Ransac<R> {
    pub fn new(config: Config, rng: R) -> Self {
        Self { config, rng }
    }

    /// Finds the model most of `data` agrees with.
    ///
    /// Fails immediately with [`Error::InsufficientData`] when there are fewer
    /// items than the minimal sample, and with [`Error::NoConsensus`] when no
    /// hypothesis gathered `max(min_inliers, MIN_SAMPLES)` inliers.
    pub fn fit<E, Data>(&mut self, estimator: &E, data: &[Data]) -> Result<Fit<E::Model>, Error>
    where
        E: Estimator<Data> + Sync,
        E::Model: Send,
        Data: Clone + Sync,
    {
        let sample_size = E::MIN_SAMPLES;
        if data.len() < sample_size {
            return Err(Error::InsufficientData {
                found: data.len(),
                required: sample_size,
            });
        }
        let required = self.config.min_inliers.max(sample_size);

        let mut best: Option<Candidate<E::Model>> = None;
        let mut budget = self.config.max_iterations;
        let mut iterations = 0;
        while iterations < budget {
            let batch = self.config.batch_size.max(1).min(budget - iterations);
            // Seeds are drawn in order so the outcome does not depend on scheduling.
            let seeds = (0..batch)
                .map(|i| (iterations + i, self.rng.next_u64()))
                .collect::<Vec<_>>();
            let config = &self.config;
            let evaluate = |&(iteration, seed): &(usize, u64)| {
                hypothesis(config, estimator, data, iteration, seed)
            };
            #[cfg(not(feature = "rayon"))]
            let batch_best = seeds.iter().map(evaluate).fold(None, better);
            #[cfg(feature = "rayon")]
            let batch_best = seeds.par_iter().map(evaluate).reduce(|| None, better);
            iterations += batch;
            best = better(best, batch_best);

            if let (Some(confidence), Some(best)) = (self.config.confidence, &best) {
                let inlier_ratio = best.inliers as f64 / data.len() as f64;
                budget = budget.min(adaptive_iterations(inlier_ratio, sample_size, confidence));
            }
            debug!(
                "{} iterations, best model has {} inliers, budget is {}.",
                iterations,
                best.as_ref().map_or(0, |b| b.inliers),
                budget
            );
        }

        let best = match best {
            Some(best) if best.inliers >= required => best,
            best => {
                return Err(Error::NoConsensus {
                    best: best.map_or(0, |b| b.inliers),
                    required,
                    iterations,
                })
            }
        };

        let model = self.refit(estimator, data, best);
        let inliers = self.inliers(&model, data);
        info!(
            "Consensus of {}/{} after {} iterations.",
            inliers.len(),
            data.len(),
            iterations
        );
        Ok(Fit {
            model,
            inliers,
            iterations,
        })
    }

    /// Least squares over the inliers of `best`, kept only if it does not lose inliers.
    fn refit<E, Data>(&self, estimator: &E, data: &[Data], best: Candidate<E::Model>) -> E::Model
    where
        E: Estimator<Data>,
        Data: Clone,
    {
        let inliers = self.inliers(&best.model, data);
        let refit = estimator
            .estimate(inliers.iter().map(|&ix| data[ix].clone()))
            .into_iter()
            .map(|model| (self.count_inliers(&model, data), model))
            .filter(|&(count, _)| count >= best.inliers)
            .max_by_key(|&(count, _)| count);
        match refit {
            Some((count, model)) => {
                debug!("Refit kept {} inliers (was {}).", count, best.inliers);
                model
            }
            None => {
                debug!("Refit lost inliers, keeping the sampled model.");
                best.model
            }
        }
    }

    fn count_inliers<M: Model<Data>, Data>(&self, model: &M, data: &[Data]) -> usize {
        count_inliers(model, data, self.config.inlier_threshold)
    }

    fn inliers<M: Model<Data>, Data>(&self, model: &M, data: &[Data]) -> Vec<usize> {
        data.iter()
            .enumerate()
            .filter(|(_, d)| model.residual(d) < self.config.inlier_threshold)
            .map(|(ix, _)| ix)
            .collect()
    }
}

/// Fits a minimal sample drawn from a generator seeded with `seed`.
///
/// A sample the estimator finds no model for is redrawn up to `max_degenerate_retries` times.
fn hypothesis<E, Data>(
    config: &Config,
    estimator: &E,
    data: &[Data],
    iteration: usize,
    seed: u64,
) -> Option<Candidate<E::Model>>
where
    E: Estimator<Data>,
    Data: Clone,
{
    let mut rng = Pcg64::seed_from_u64(seed);
    for _ in 0..=config.max_degenerate_retries {
        let sample = index::sample(&mut rng, data.len(), E::MIN_SAMPLES).into_vec();
        let best = estimator
            .estimate(sample.iter().map(|&ix| data[ix].clone()))
            .into_iter()
            .map(|model| Candidate {
                iteration,
                inliers: count_inliers(&model, data, config.inlier_threshold),
                model,
            })
            .fold(None, |a, b| better(a, Some(b)));
        if best.is_some() {
            return best;
        }
        trace!("Degenerate sample in iteration {}, redrawing.", iteration);
    }
    None
}

fn count_inliers<M: Model<Data>, Data>(model: &M, data: &[Data], threshold: f64) -> usize {
    data.iter()
        .filter(|d| model.residual(d) < threshold)
        .count()
}

impl<E, R, Data> Consensus<E, Data> for Ransac<R>
where
    E: Estimator<Data> + Sync,
    E::Model: Send,
    R: RngCore,
    Data: Clone + Sync,
{
    type Inliers = Vec<usize>;

    fn model<I>(&mut self, estimator: &E, data: I) -> Option<E::Model>
    where
        I: Iterator<Item = Data> + Clone,
    {
        self.model_inliers(estimator, data).map(|(model, _)| model)
    }

    fn model_inliers<I>(&mut self, estimator: &E, data: I) -> Option<(E::Model, Self::Inliers)>
    where
        I: Iterator<Item = Data> + Clone,
    {
        let data = data.collect::<Vec<_>>();
        self.fit(estimator, &data)
            .map_err(|e| debug!("No model: {}", e))
            .ok()
            .map(|fit| (fit.model, fit.inliers))
    }
}

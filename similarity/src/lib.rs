//! Estimation of the 2d similarity that best maps one point set onto another.
//!
//! [`SimilarityEstimator`] computes the closed-form least-squares solution
//! (Umeyama's method restricted to the plane) for any number of correspondences
//! greater than or equal to two. With exactly two correspondences the fit is exact.

use align_core::{
    nalgebra::{Point2, Rotation2, Vector2},
    sample_consensus::Estimator,
    FeatureMatch, Similarity,
};

/// Fits a [`Similarity`] to `FeatureMatch(source, target)` correspondences.
#[derive(Copy, Clone, Debug)]
pub struct SimilarityEstimator {
    /// Root mean square distance of the source points to their centroid below
    /// which the input is considered degenerate.
    pub min_spread: f64,
}

impl SimilarityEstimator {
    pub fn new() -> Self {
        Default::default()
    }

    /// The least-squares similarity mapping every source onto its target.
    ///
    /// Returns `None` for fewer than two correspondences, for sources that are
    /// (nearly) coincident, or when the solution has no positive finite scale.
    pub fn from_matches<I>(&self, data: I) -> Option<Similarity>
    where
        I: Iterator<Item = FeatureMatch<Point2<f64>>> + Clone,
    {
        let (count, source_sum, target_sum) = data.clone().fold(
            (0usize, Vector2::<f64>::zeros(), Vector2::<f64>::zeros()),
            |(n, s, t), FeatureMatch(a, b)| (n + 1, s + a.coords, t + b.coords),
        );
        if count < 2 {
            return None;
        }
        let source_mean = source_sum / count as f64;
        let target_mean = target_sum / count as f64;

        let mut dot = 0.0;
        let mut cross = 0.0;
        let mut spread = 0.0;
        for FeatureMatch(a, b) in data {
            let a = a.coords - source_mean;
            let b = b.coords - target_mean;
            dot += a.dot(&b);
            cross += a.x * b.y - a.y * b.x;
            spread += a.norm_squared();
        }
        if (spread / count as f64).sqrt() < self.min_spread {
            return None;
        }

        let angle = cross.atan2(dot);
        let scale = dot.hypot(cross) / spread;
        let translation = target_mean - Rotation2::new(angle) * source_mean * scale;
        Similarity::new(scale, angle, translation)
    }
}

impl Default for SimilarityEstimator {
    fn default() -> Self {
        Self { min_spread: 1e-6 }
    }
}

impl Estimator<FeatureMatch<Point2<f64>>> for SimilarityEstimator {
    type Model = Similarity;
    type ModelIter = Option<Similarity>;
    const MIN_SAMPLES: usize = 2;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<Point2<f64>>> + Clone,
    {
        self.from_matches(data)
    }
}

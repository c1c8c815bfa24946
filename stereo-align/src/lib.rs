//! Feature based pre-alignment of stereo image pairs.
//!
//! The right image of a pair is brought into the frame of the left (reference)
//! image by a similarity transform, so that a dense stereo matcher only has to
//! search along roughly horizontal lines. The transform is found by:
//!
//! 1. reducing both images to one float intensity channel,
//! 2. detecting interest points tile by tile and keeping the strongest,
//! 3. describing every point,
//! 4. matching descriptors from left to right,
//! 5. fitting a similarity to the matches with RANSAC.
//!
//! The right image is then resampled through the transform. [`export`] writes
//! the matrix and the image pair to disk.
//!
//! ```no_run
//! use stereo_align::{export, AlignSettings, StereoAligner};
//!
//! let settings = AlignSettings::default();
//! let alignment = StereoAligner::new(settings.clone()).align_files("left.png", "right.png")?;
//! println!("scale {} angle {}", alignment.transform.scale(), alignment.transform.angle());
//! export("pair", &alignment, &settings.rescale)?;
//! # Ok::<(), stereo_align::Error>(())
//! ```

mod error;
pub mod export;
pub mod matching;
mod settings;
pub mod warp;

pub use align_core::{Feature, Match, Similarity};
pub use error::{Error, Side};
pub use export::export;
pub use keypoints::GrayFloatImage;
pub use settings::*;

use align_core::nalgebra::Point2;
use align_core::sample_consensus::Estimator;
use align_core::{FeatureMatch, ImagePoint};
use image::DynamicImage;
use keypoints::{cull, DescriptorExtractor, Detector, Tiled};
use log::*;
use matching::{MatchPolicy, Matcher};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use ransac::Ransac;
use similarity::SimilarityEstimator;
use std::path::Path;

/// Fewest features an image must yield, the minimal sample of a similarity.
const MIN_FEATURES: usize =
    <SimilarityEstimator as Estimator<FeatureMatch<Point2<f64>>>>::MIN_SAMPLES;

/// The similarity found between two feature sets and the evidence for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Maps points of the right image onto the left image.
    pub transform: Similarity,
    /// Every match the transform was fitted to.
    pub matches: Vec<Match>,
    /// Indices into `matches` consistent with `transform`.
    pub inliers: Vec<usize>,
    /// RANSAC iterations spent.
    pub iterations: usize,
}

/// A registered pair with the right image resampled into the left frame.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Maps points of the right image onto the left image.
    pub transform: Similarity,
    pub matches: Vec<Match>,
    /// Indices into `matches` consistent with `transform`.
    pub inliers: Vec<usize>,
    pub iterations: usize,
    /// The left image, unchanged.
    pub reference: GrayFloatImage,
    /// The right image warped to the size and frame of the left image.
    pub warped: GrayFloatImage,
}

/// Runs the alignment pipeline with fixed settings.
#[derive(Debug, Clone, Default)]
pub struct StereoAligner {
    pub settings: AlignSettings,
}

impl StereoAligner {
    pub fn new(settings: AlignSettings) -> Self {
        Self { settings }
    }

    /// Detects, culls and describes the features of one image.
    pub fn extract(&self, image: &GrayFloatImage, side: Side) -> Result<Vec<Feature>, Error> {
        let detector = Tiled::new(
            self.settings.detector.build(),
            self.settings.max_tile_dimension,
        );
        let points = detector.detect(image);
        let detected = points.len();
        let points = cull(points, self.settings.max_features);
        let features = self.settings.descriptor.build().extract(image, &points);
        info!(
            "Extracted {} features from the {} image ({} points detected).",
            features.len(),
            side,
            detected
        );
        if features.len() < MIN_FEATURES {
            return Err(Error::InsufficientFeatures {
                image: side,
                found: features.len(),
                required: MIN_FEATURES,
            });
        }
        Ok(features)
    }

    /// Matches left features to right features and fits the right-to-left similarity.
    pub fn register(&self, left: &[Feature], right: &[Feature]) -> Result<Registration, Error> {
        let matcher = Matcher::new()
            .constraint(MatchPolicy::from(&self.settings.matching))
            .cross_check(self.settings.matching.cross_check);
        let matches = matcher.match_features(left, right);
        let correspondences = matches
            .iter()
            .map(|m| {
                FeatureMatch(
                    right[m.index_b].point.image_point(),
                    left[m.index_a].point.image_point(),
                )
            })
            .collect::<Vec<_>>();

        let mut ransac = Ransac::new(
            ransac::Config::from(&self.settings.consensus),
            Pcg64::seed_from_u64(self.settings.seed),
        );
        let fit = ransac
            .fit(&SimilarityEstimator::new(), &correspondences)
            .map_err(|e| Error::from_consensus(e, matches.len()))?;
        info!(
            "Fitted scale {:.5}, angle {:.5} rad, translation ({:.3}, {:.3}) with {}/{} inliers.",
            fit.model.scale(),
            fit.model.angle(),
            fit.model.translation().x,
            fit.model.translation().y,
            fit.inliers.len(),
            matches.len()
        );
        Ok(Registration {
            transform: fit.model,
            matches,
            inliers: fit.inliers,
            iterations: fit.iterations,
        })
    }

    /// Aligns `right` onto `left`.
    pub fn align(&self, left: &GrayFloatImage, right: &GrayFloatImage) -> Result<Alignment, Error> {
        let left_features = self.extract(left, Side::Left)?;
        let right_features = self.extract(right, Side::Right)?;
        let Registration {
            transform,
            matches,
            inliers,
            iterations,
        } = self.register(&left_features, &right_features)?;
        let warped = warp::warp(
            right,
            &transform,
            left.width(),
            left.height(),
            self.settings.background,
        );
        debug!("Warped the right image to {}x{}.", left.width(), left.height());
        Ok(Alignment {
            transform,
            matches,
            inliers,
            iterations,
            reference: left.clone(),
            warped,
        })
    }

    /// Aligns two decoded images, reducing colour images to intensity first.
    pub fn align_images(
        &self,
        left: &DynamicImage,
        right: &DynamicImage,
    ) -> Result<Alignment, Error> {
        self.align(
            &GrayFloatImage::from_dynamic(left),
            &GrayFloatImage::from_dynamic(right),
        )
    }

    /// Loads and aligns two image files.
    pub fn align_files(
        &self,
        left: impl AsRef<Path>,
        right: impl AsRef<Path>,
    ) -> Result<Alignment, Error> {
        let (left, right) = (left.as_ref(), right.as_ref());
        info!("Aligning {} onto {}.", right.display(), left.display());
        self.align_images(&image::open(left)?, &image::open(right)?)
    }
}

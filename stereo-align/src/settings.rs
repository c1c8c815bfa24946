use crate::warp::Rescale;
use crate::Error;
use keypoints::{
    DescriptorExtractor, Detector, GradientHistogramDescriptor, Harris, Hessian, PatchDescriptor,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The settings for the alignment process.
///
/// Every field has a default, so a settings file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignSettings {
    /// Images are detected in tiles no larger than this on either side.
    #[serde(default = "default_max_tile_dimension")]
    pub max_tile_dimension: usize,
    /// The interest point detector.
    #[serde(default)]
    pub detector: DetectorSettings,
    /// Only this many of the strongest points of each image are described. `None` keeps all of them.
    #[serde(default = "default_max_features")]
    pub max_features: Option<usize>,
    /// The descriptor computed for every point.
    #[serde(default)]
    pub descriptor: DescriptorSettings,
    /// Constraints on the nearest neighbour matches.
    #[serde(default)]
    pub matching: MatchingSettings,
    /// The robust similarity fit.
    #[serde(default)]
    pub consensus: ConsensusSettings,
    /// Seed of the random number generator used by the fit.
    #[serde(default)]
    pub seed: u64,
    /// Value of warped pixels that have no source.
    #[serde(default)]
    pub background: f32,
    /// How both output images are mapped to 8 bits.
    #[serde(default)]
    pub rescale: Rescale,
}

impl Default for AlignSettings {
    fn default() -> Self {
        Self {
            max_tile_dimension: default_max_tile_dimension(),
            detector: Default::default(),
            max_features: default_max_features(),
            descriptor: Default::default(),
            matching: Default::default(),
            consensus: Default::default(),
            seed: 0,
            background: 0.0,
            rescale: Default::default(),
        }
    }
}

impl AlignSettings {
    /// Reads settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

fn default_max_tile_dimension() -> usize {
    2048
}

fn default_max_features() -> Option<usize> {
    Some(800)
}

/// Selects the detector variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorSettings {
    Harris(Harris),
    Hessian(Hessian),
}

impl Default for DetectorSettings {
    fn default() -> Self {
        DetectorSettings::Harris(Harris::default())
    }
}

impl DetectorSettings {
    pub fn build(&self) -> Box<dyn Detector> {
        match *self {
            DetectorSettings::Harris(harris) => Box::new(harris),
            DetectorSettings::Hessian(hessian) => Box::new(hessian),
        }
    }

    /// Sets the response threshold of whichever detector is selected.
    pub fn set_threshold(&mut self, threshold: f32) {
        match self {
            DetectorSettings::Harris(harris) => harris.threshold = threshold,
            DetectorSettings::Hessian(hessian) => hessian.threshold = threshold,
        }
    }
}

/// Selects the descriptor variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DescriptorSettings {
    Patch(PatchDescriptor),
    GradientHistogram(GradientHistogramDescriptor),
}

impl Default for DescriptorSettings {
    fn default() -> Self {
        DescriptorSettings::Patch(PatchDescriptor::default())
    }
}

impl DescriptorSettings {
    pub fn build(&self) -> Box<dyn DescriptorExtractor> {
        match *self {
            DescriptorSettings::Patch(patch) => Box::new(patch),
            DescriptorSettings::GradientHistogram(histogram) => Box::new(histogram),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    /// Reject a match unless its distance is below `ratio` times the second best distance.
    pub ratio: Option<f32>,
    /// Reject matches whose descriptor distance exceeds this.
    pub max_distance: Option<f32>,
    /// Only keep mutual nearest neighbours.
    pub cross_check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusSettings {
    /// Re-projection distance in pixels below which a match is an inlier.
    pub inlier_threshold: f64,
    /// Upper bound on RANSAC iterations.
    pub max_iterations: usize,
    /// Adaptive stopping confidence. `None` always runs `max_iterations`.
    pub confidence: Option<f64>,
    /// Fewest inliers an acceptable transform may have.
    pub min_inliers: usize,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self {
            inlier_threshold: 3.0,
            max_iterations: 1000,
            confidence: Some(0.999),
            min_inliers: 3,
        }
    }
}

impl From<&ConsensusSettings> for ransac::Config {
    fn from(settings: &ConsensusSettings) -> Self {
        ransac::Config {
            inlier_threshold: settings.inlier_threshold,
            max_iterations: settings.max_iterations,
            confidence: settings.confidence,
            min_inliers: settings.min_inliers,
            ..ransac::Config::default()
        }
    }
}

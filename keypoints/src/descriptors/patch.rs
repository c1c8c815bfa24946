use super::{has_contrast, normalize, Grid, Pyramid};
use crate::image::GrayFloatImage;
use crate::{DescriptorExtractor, Error};
use align_core::{Descriptor, Feature, InterestPoint};
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A square patch of intensities normalized for gain and bias.
///
/// `patch_size * patch_size` samples are taken on a grid spaced `scale * spacing`
/// pixels apart, rotated by the point orientation when there is one. The patch is
/// shifted to zero mean and scaled to unit norm, so an affine change of intensity
/// leaves the descriptor unchanged.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct PatchDescriptor {
    /// Number of samples along each side.
    ///
    /// Default is `21`.
    pub patch_size: usize,
    /// Sample spacing in units of the point scale.
    ///
    /// Default is `0.5`.
    pub spacing: f32,
    /// Sigma of the smoothing applied before sampling.
    ///
    /// Default is `1.0`.
    pub smoothing: f32,
}

impl Default for PatchDescriptor {
    fn default() -> PatchDescriptor {
        PatchDescriptor {
            patch_size: 21,
            spacing: 0.5,
            smoothing: 1.0,
        }
    }
}

impl PatchDescriptor {
    /// A descriptor with the default parameters and the given side length.
    pub fn new(patch_size: usize) -> Self {
        Self {
            patch_size,
            ..Default::default()
        }
    }

    fn describe(&self, pyramid: &Pyramid, point: &InterestPoint) -> Result<Descriptor, Error> {
        let size = self.patch_size;
        let grid = Grid::new(pyramid, point, size, self.spacing)?;
        let mut values = Vec::with_capacity(size * size);
        for j in 0..size as isize {
            for i in 0..size as isize {
                values.push(grid.sample(i, j)?);
            }
        }
        let flat = Error::FlatPatch {
            x: point.x,
            y: point.y,
        };
        if !has_contrast(&values) {
            return Err(flat);
        }
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64;
        for v in values.iter_mut() {
            *v = (f64::from(*v) - mean) as f32;
        }
        normalize(&mut values).ok_or(flat)?;
        Ok(Descriptor(values))
    }
}

impl DescriptorExtractor for PatchDescriptor {
    fn len(&self) -> usize {
        self.patch_size * self.patch_size
    }

    fn extract(&self, image: &GrayFloatImage, points: &[InterestPoint]) -> Vec<Feature> {
        let pyramid = Pyramid::new(image, self.smoothing, points);
        let describe = |point: &InterestPoint| match self.describe(&pyramid, point) {
            Ok(descriptor) => Some(Feature {
                point: *point,
                descriptor,
            }),
            Err(e) => {
                trace!("Excluding point: {}", e);
                None
            }
        };
        #[cfg(not(feature = "rayon"))]
        let features: Vec<Feature> = points.iter().filter_map(describe).collect();
        #[cfg(feature = "rayon")]
        let features: Vec<Feature> = points.par_iter().filter_map(describe).collect();
        debug!(
            "Described {}/{} points with {}x{} patches.",
            features.len(),
            points.len(),
            self.patch_size,
            self.patch_size
        );
        features
    }
}

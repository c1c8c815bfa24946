use super::{has_contrast, normalize, Grid, Pyramid};
use crate::image::GrayFloatImage;
use crate::{DescriptorExtractor, Error};
use align_core::{Descriptor, Feature, InterestPoint};
use log::*;
use std::f32::consts::PI;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cells along each side of the descriptor window.
const CELLS: usize = 4;
/// Samples along each side of a cell.
const CELL_SAMPLES: usize = 4;
/// Orientation bins per cell.
const BINS: usize = 8;
/// Samples along each side of the descriptor window.
const WINDOW: usize = CELLS * CELL_SAMPLES;
/// Normalized values are clipped to this before renormalization.
const CLIP: f32 = 0.2;

/// Histograms of gradient orientation over a 4x4 grid of cells.
///
/// Each of the 16 cells holds 8 orientation bins of Gaussian weighted gradient
/// magnitude, giving 128 values. Gradients are measured in the frame of the
/// point orientation. The vector is normalized, clipped at 0.2 and normalized
/// again, which limits the influence of a few strong edges.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct GradientHistogramDescriptor {
    /// Sample spacing in units of the point scale.
    ///
    /// Default is `0.75`.
    pub spacing: f32,
    /// Sigma of the smoothing applied before sampling.
    ///
    /// Default is `1.0`.
    pub smoothing: f32,
}

impl Default for GradientHistogramDescriptor {
    fn default() -> GradientHistogramDescriptor {
        GradientHistogramDescriptor {
            spacing: 0.75,
            smoothing: 1.0,
        }
    }
}

impl GradientHistogramDescriptor {
    fn describe(&self, pyramid: &Pyramid, point: &InterestPoint) -> Result<Descriptor, Error> {
        let grid = Grid::new(pyramid, point, WINDOW, self.spacing)?;
        // Samples with a one cell apron for the central differences.
        let side = WINDOW + 2;
        let mut samples = Vec::with_capacity(side * side);
        for j in -1..=WINDOW as isize {
            for i in -1..=WINDOW as isize {
                samples.push(grid.sample(i, j)?);
            }
        }
        let flat = || Error::FlatPatch {
            x: point.x,
            y: point.y,
        };
        if !has_contrast(&samples) {
            return Err(flat());
        }
        let at = |i: isize, j: isize| samples[(j + 1) as usize * side + (i + 1) as usize];

        let mut histogram = vec![0f32; CELLS * CELLS * BINS];
        let sigma = WINDOW as f32 / 2.0;
        let center = (WINDOW as f32 - 1.0) / 2.0;
        for j in 0..WINDOW {
            for i in 0..WINDOW {
                let (si, sj) = (i as isize, j as isize);
                let gx = 0.5 * (at(si + 1, sj) - at(si - 1, sj));
                let gy = 0.5 * (at(si, sj + 1) - at(si, sj - 1));
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude == 0.0 {
                    continue;
                }
                let (dx, dy) = (i as f32 - center, j as f32 - center);
                let weight = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                let mut angle = gy.atan2(gx);
                if angle < 0.0 {
                    angle += 2.0 * PI;
                }
                // Split the magnitude between the two nearest bins.
                let position = angle / (2.0 * PI) * BINS as f32;
                let lower = position.floor();
                let fraction = position - lower;
                let lower = lower as usize % BINS;
                let upper = (lower + 1) % BINS;
                let cell = (j / CELL_SAMPLES) * CELLS + i / CELL_SAMPLES;
                histogram[cell * BINS + lower] += weight * magnitude * (1.0 - fraction);
                histogram[cell * BINS + upper] += weight * magnitude * fraction;
            }
        }

        normalize(&mut histogram).ok_or_else(flat)?;
        for v in histogram.iter_mut() {
            *v = v.min(CLIP);
        }
        normalize(&mut histogram).ok_or_else(flat)?;
        Ok(Descriptor(histogram))
    }
}

impl DescriptorExtractor for GradientHistogramDescriptor {
    fn len(&self) -> usize {
        CELLS * CELLS * BINS
    }

    fn extract(&self, image: &GrayFloatImage, points: &[InterestPoint]) -> Vec<Feature> {
        let pyramid = Pyramid::new(image, self.smoothing, points);
        let describe = |point: &InterestPoint| {
            self.describe(&pyramid, point)
                .map(|descriptor| Feature {
                    point: *point,
                    descriptor,
                })
                .map_err(|e| trace!("Excluding point: {}", e))
                .ok()
        };
        #[cfg(not(feature = "rayon"))]
        let features: Vec<Feature> = points.iter().filter_map(describe).collect();
        #[cfg(feature = "rayon")]
        let features: Vec<Feature> = points.par_iter().filter_map(describe).collect();
        debug!(
            "Described {}/{} points with gradient histograms.",
            features.len(),
            points.len()
        );
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> GrayFloatImage {
        GrayFloatImage::from_fn(64, 64, |x, _| x as f32 / 64.0)
    }

    fn textured() -> GrayFloatImage {
        GrayFloatImage::from_fn(64, 64, |x, y| {
            let (x, y) = (x as f32, y as f32);
            0.5 + 0.3 * (x * 0.4).sin() * (y * 0.3).cos()
        })
    }

    #[test]
    fn length_and_norm() {
        let point = InterestPoint::new(32.0, 32.0, 2.0, 1.0);
        let extractor = GradientHistogramDescriptor::default();
        let features = extractor.extract(&textured(), &[point]);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].descriptor.len(), extractor.len());
        let norm = features[0].descriptor.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-4);
        assert!(features[0].descriptor.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn ramp_fills_the_zero_bin() {
        let point = InterestPoint::new(32.0, 32.0, 2.0, 1.0);
        let features = GradientHistogramDescriptor::default().extract(&ramp(), &[point]);
        let descriptor = &features[0].descriptor;
        for cell in 0..CELLS * CELLS {
            let bins = &descriptor[cell * BINS..(cell + 1) * BINS];
            assert!(bins[0] > 0.0);
            assert!(bins[1..].iter().all(|&v| v.abs() < 1e-6));
        }
    }

    #[test]
    fn rotation_follows_orientation() {
        // A ramp rising along +y, described in a frame turned by 90 degrees, looks like the +x ramp.
        let vertical = GrayFloatImage::from_fn(64, 64, |_, y| y as f32 / 64.0);
        let point = InterestPoint {
            orientation: Some(PI / 2.0),
            ..InterestPoint::new(32.0, 32.0, 2.0, 1.0)
        };
        let extractor = GradientHistogramDescriptor::default();
        let turned = extractor.extract(&vertical, &[point]);
        let straight = extractor.extract(&ramp(), &[InterestPoint::new(32.0, 32.0, 2.0, 1.0)]);
        assert!(turned[0].descriptor.distance(&straight[0].descriptor) < 1e-3);
    }

    #[test]
    fn flat_windows_are_excluded() {
        let point = InterestPoint::new(32.0, 32.0, 2.0, 1.0);
        for level in [0.0, 0.3, 1.0] {
            let flat = GrayFloatImage::from_fn(64, 64, |_, _| level);
            assert!(GradientHistogramDescriptor::default()
                .extract(&flat, &[point])
                .is_empty());
        }
    }

    #[test]
    fn border_points_are_excluded() {
        let point = InterestPoint::new(60.0, 10.0, 2.0, 1.0);
        assert!(GradientHistogramDescriptor::default()
            .extract(&textured(), &[point])
            .is_empty());
    }
}

mod gradient_histogram;
mod patch;

pub use gradient_histogram::GradientHistogramDescriptor;
pub use patch::PatchDescriptor;

use crate::extrema::to_octave;
use crate::image::{gaussian_blur, GrayFloatImage};
use crate::Error;
use align_core::InterestPoint;

/// The smoothed input image and its successive half size reductions.
pub(crate) struct Pyramid {
    levels: Vec<GrayFloatImage>,
}

impl Pyramid {
    /// Builds enough levels to sample every point of `points`.
    pub fn new(image: &GrayFloatImage, smoothing: f32, points: &[InterestPoint]) -> Self {
        let top = points.iter().map(|p| p.octave).max().unwrap_or(0);
        let mut levels = vec![if smoothing > 0.0 {
            gaussian_blur(image, smoothing)
        } else {
            image.clone()
        }];
        for _ in 0..top {
            let next = levels[levels.len() - 1].half_size();
            if next.width() == 0 || next.height() == 0 {
                break;
            }
            levels.push(next);
        }
        Self { levels }
    }
}

/// A square grid of sample locations centred on a point and rotated by its orientation.
pub(crate) struct Grid<'a> {
    level: &'a GrayFloatImage,
    x: f32,
    y: f32,
    cos: f32,
    sin: f32,
    step: f32,
    half: f32,
}

impl<'a> Grid<'a> {
    /// A `size` x `size` grid with `spacing` full resolution pixels per unit of scale.
    pub fn new(pyramid: &'a Pyramid, point: &InterestPoint, size: usize, spacing: f32) -> Result<Self, Error> {
        let level = pyramid
            .levels
            .get(point.octave as usize)
            .ok_or(Error::SampleOutOfBounds {
                x: point.x,
                y: point.y,
                width: 0,
                height: 0,
            })?;
        let angle = point.orientation.unwrap_or(0.0);
        Ok(Self {
            level,
            x: to_octave(point.x, point.octave),
            y: to_octave(point.y, point.octave),
            cos: angle.cos(),
            sin: angle.sin(),
            step: point.scale * spacing / (1u32 << point.octave) as f32,
            half: (size as f32 - 1.0) / 2.0,
        })
    }

    /// Intensity at grid cell `(i, j)`, where `(0, 0)` is the top-left cell.
    ///
    /// Cells outside `0..size` may be sampled too, they extend the same lattice.
    pub fn sample(&self, i: isize, j: isize) -> Result<f32, Error> {
        let u = (i as f32 - self.half) * self.step;
        let v = (j as f32 - self.half) * self.step;
        let x = self.x + u * self.cos - v * self.sin;
        let y = self.y + u * self.sin + v * self.cos;
        self.level.sample(x, y).ok_or(Error::SampleOutOfBounds {
            x,
            y,
            width: self.level.width(),
            height: self.level.height(),
        })
    }
}

/// Spread of samples, relative to their magnitude, below which a patch is flat.
const MIN_CONTRAST: f32 = 1e-4;

/// Whether the samples vary by more than rounding error at their intensity level.
pub(crate) fn has_contrast(samples: &[f32]) -> bool {
    let (min, max) = samples
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    max - min > MIN_CONTRAST * min.abs().max(max.abs())
}

/// Scales `values` to unit L2 norm.
pub(crate) fn normalize(values: &mut [f32]) -> Option<()> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm < 1e-6 || !norm.is_finite() {
        return None;
    }
    for v in values.iter_mut() {
        *v /= norm;
    }
    Some(())
}

//! Resampling through a similarity and conversion of the results to 8 bits.

use align_core::nalgebra::Point2;
use align_core::Similarity;
use image::{GrayImage, Luma};
use keypoints::GrayFloatImage;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Resamples `source` into a `width` x `height` image in the frame `transform` maps it into.
///
/// Every output pixel is mapped back through the inverse transform and
/// bilinearly interpolated. Pixels with no source get `background`.
pub fn warp(
    source: &GrayFloatImage,
    transform: &Similarity,
    width: usize,
    height: usize,
    background: f32,
) -> GrayFloatImage {
    let inverse = transform.inverse();
    let mut output = GrayFloatImage::new(width, height);
    if width == 0 {
        return output;
    }
    let fill_row = |(y, row): (usize, &mut [f32])| {
        for (x, out) in row.iter_mut().enumerate() {
            let p = inverse.transform_point(&Point2::new(x as f64, y as f64));
            *out = source
                .sample(p.x as f32, p.y as f32)
                .unwrap_or(background);
        }
    };
    let data: &mut [f32] = &mut output.0;
    #[cfg(not(feature = "rayon"))]
    data.chunks_mut(width).enumerate().for_each(fill_row);
    #[cfg(feature = "rayon")]
    data.par_chunks_mut(width).enumerate().for_each(fill_row);
    output
}

/// How float intensities are mapped onto `0..=255`.
///
/// One rule is applied to both images of a pair so their intensities stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rescale {
    /// `min` maps to 0 and `max` to 255, values outside are clamped.
    FixedRange { min: f32, max: f32 },
    /// The range spanned by both images together.
    MinMax,
}

impl Default for Rescale {
    fn default() -> Self {
        Rescale::FixedRange { min: 0.0, max: 1.0 }
    }
}

impl Rescale {
    /// The input range of the rule over `images`.
    pub fn range(&self, images: &[&GrayFloatImage]) -> (f32, f32) {
        match *self {
            Rescale::FixedRange { min, max } => (min, max),
            Rescale::MinMax => images
                .iter()
                .filter_map(|image| image.min_max())
                .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
                .unwrap_or((0.0, 0.0)),
        }
    }

    /// Quantizes every image of `images` with the range computed over all of them.
    ///
    /// An empty range maps everything to 0.
    pub fn apply(&self, images: &[&GrayFloatImage]) -> Vec<GrayImage> {
        let (min, max) = self.range(images);
        let span = max - min;
        let quantize = |v: f32| {
            if span > 0.0 {
                ((v - min) / span * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        };
        images
            .iter()
            .map(|image| {
                GrayImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
                    Luma([quantize(image.get(x as usize, y as usize))])
                })
            })
            .collect()
    }
}

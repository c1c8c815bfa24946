//! Interest point detection and description for stereo pre-alignment.
//!
//! Detection and description are pluggable: anything implementing [`Detector`]
//! can be run (optionally tile by tile through [`Tiled`]) and anything
//! implementing [`DescriptorExtractor`] can describe the result. Two variants of
//! each are provided:
//!
//! * [`Harris`]: multi-octave corner response detector.
//! * [`Hessian`]: scale-space determinant of Hessian detector with orientation.
//! * [`PatchDescriptor`]: gain and bias normalized intensity patch.
//! * [`GradientHistogramDescriptor`]: 4x4 cells of 8-bin gradient orientation histograms.
//!
//! # Example
//! ```
//! use keypoints::{cull, DescriptorExtractor, Detector, GrayFloatImage, Harris, PatchDescriptor, Tiled};
//!
//! let image = GrayFloatImage::from_fn(96, 96, |x, y| {
//!     if (32..64).contains(&x) && (32..64).contains(&y) { 1.0 } else { 0.0 }
//! });
//! let detector = Tiled::new(Harris::default(), 2048);
//! let points = cull(detector.detect(&image), Some(800));
//! let features = PatchDescriptor::default().extract(&image, &points);
//! assert!(features.len() <= points.len());
//! ```

mod derivatives;
mod descriptors;
mod extrema;
mod harris;
mod hessian;
pub mod image;
mod orientation;
mod tiles;

pub use crate::image::GrayFloatImage;
pub use align_core::{Descriptor, Feature, InterestPoint};
pub use descriptors::*;
pub use harris::*;
pub use hessian::*;
pub use tiles::*;

use float_ord::FloatOrd;
use log::*;

/// Errors raised while sampling the neighbourhood of a single point.
///
/// These never escape [`DescriptorExtractor::extract`]: a point whose descriptor
/// cannot be computed is excluded from the output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sample ({x}, {y}) is outside the {width}x{height} image")]
    SampleOutOfBounds {
        x: f32,
        y: f32,
        width: usize,
        height: usize,
    },
    #[error("patch around ({x}, {y}) has no contrast")]
    FlatPatch { x: f32, y: f32 },
}

/// Finds interest points in a single channel image.
pub trait Detector: Send + Sync {
    /// Detects interest points. The same image always yields the same points in the same order.
    fn detect(&self, image: &GrayFloatImage) -> Vec<InterestPoint>;

    /// The number of pixels of surrounding context a point needs to be detected
    /// exactly as it would be on the whole image.
    fn margin(&self) -> usize;
}

/// Computes a fixed-length descriptor for interest points.
pub trait DescriptorExtractor: Send + Sync {
    /// The length of every descriptor this extractor produces.
    fn len(&self) -> usize;

    /// Describes the points on `image`.
    ///
    /// Points whose sampling footprint leaves the image (or that cannot be
    /// described for another reason) are excluded, every returned feature
    /// carries exactly one descriptor of length [`DescriptorExtractor::len`].
    fn extract(&self, image: &GrayFloatImage, points: &[InterestPoint]) -> Vec<Feature>;
}

impl<T: Detector + ?Sized> Detector for Box<T> {
    fn detect(&self, image: &GrayFloatImage) -> Vec<InterestPoint> {
        (**self).detect(image)
    }

    fn margin(&self) -> usize {
        (**self).margin()
    }
}

impl<T: DescriptorExtractor + ?Sized> DescriptorExtractor for Box<T> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn extract(&self, image: &GrayFloatImage, points: &[InterestPoint]) -> Vec<Feature> {
        (**self).extract(image, points)
    }
}

/// Sorts points by descending response, breaking ties by location.
pub fn sort_by_response(points: &mut [InterestPoint]) {
    points.sort_by_key(|p| (FloatOrd(-p.response), FloatOrd(p.y), FloatOrd(p.x)));
}

/// Keeps only the `max` points with the highest response.
///
/// `None` disables the cap. The result is sorted as by [`sort_by_response`].
pub fn cull(mut points: Vec<InterestPoint>, max: Option<usize>) -> Vec<InterestPoint> {
    sort_by_response(&mut points);
    if let Some(max) = max {
        if points.len() > max {
            debug!("Truncating {} points to {}.", points.len(), max);
            points.truncate(max);
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32, y: f32, response: f32) -> InterestPoint {
        InterestPoint::new(x, y, 1.0, response)
    }

    #[test]
    fn cull_keeps_strongest() {
        let points = vec![
            point(0.0, 0.0, 0.1),
            point(1.0, 0.0, 0.9),
            point(2.0, 0.0, 0.5),
            point(3.0, 0.0, 0.7),
        ];
        let culled = cull(points, Some(2));
        assert_eq!(culled.len(), 2);
        assert_eq!(culled[0].response, 0.9);
        assert_eq!(culled[1].response, 0.7);
    }

    #[test]
    fn cull_disabled_keeps_everything_sorted() {
        let points = vec![point(5.0, 1.0, 0.2), point(4.0, 1.0, 0.2), point(0.0, 0.0, 0.3)];
        let culled = cull(points, None);
        assert_eq!(culled.len(), 3);
        assert_eq!((culled[0].x, culled[1].x, culled[2].x), (0.0, 4.0, 5.0));
    }

    #[test]
    fn cull_with_large_cap_is_noop() {
        let points = vec![point(0.0, 0.0, 0.1)];
        assert_eq!(cull(points, Some(800)).len(), 1);
    }
}

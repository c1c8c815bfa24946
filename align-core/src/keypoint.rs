use nalgebra::Point2;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Allows the retrieval of the point on the image the feature came from.
pub trait ImagePoint {
    /// Retrieves the point on the image
    fn image_point(&self) -> Point2<f64>;
}

impl ImagePoint for Point2<f64> {
    fn image_point(&self) -> Point2<f64> {
        *self
    }
}

/// A location in an image judged locally distinctive by a detector.
///
/// All coordinates and sizes are expressed in pixels of the full resolution
/// image, even when the point was found on a coarser pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct InterestPoint {
    /// Sub-pixel horizontal coordinate (+x faces right).
    pub x: f32,
    /// Sub-pixel vertical coordinate (+y faces down).
    pub y: f32,
    /// Characteristic radius of the point.
    pub scale: f32,
    /// The pyramid level (each level halves the resolution) the point was found on.
    pub octave: u32,
    /// Dominant orientation in radians, if the detector computes one.
    pub orientation: Option<f32>,
    /// The magnitude of response from the detector.
    pub response: f32,
}

impl InterestPoint {
    /// Creates an unoriented point found on the full resolution image.
    pub fn new(x: f32, y: f32, scale: f32, response: f32) -> Self {
        Self {
            x,
            y,
            scale,
            octave: 0,
            orientation: None,
            response,
        }
    }
}

impl ImagePoint for InterestPoint {
    fn image_point(&self) -> Point2<f64> {
        Point2::new(self.x as f64, self.y as f64)
    }
}

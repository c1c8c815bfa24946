use crate::image::{separable_filter, GrayFloatImage};

/// Central difference along the derivative axis.
const DIFFERENCE: [f32; 3] = [-0.5, 0.0, 0.5];
/// Scharr smoothing across the derivative axis, normalized to unit sum.
const SMOOTHING: [f32; 3] = [3.0 / 16.0, 10.0 / 16.0, 3.0 / 16.0];

/// Horizontal derivative (per pixel) using a normalized Scharr operator.
pub fn scharr_horizontal(image: &GrayFloatImage) -> GrayFloatImage {
    GrayFloatImage(separable_filter(&image.0, &DIFFERENCE, &SMOOTHING))
}

/// Vertical derivative (per pixel) using a normalized Scharr operator.
pub fn scharr_vertical(image: &GrayFloatImage) -> GrayFloatImage {
    GrayFloatImage(separable_filter(&image.0, &SMOOTHING, &DIFFERENCE))
}

use crate::image::GrayFloatImage;
use std::f32::consts::PI;

/// Radius of the sampling disc in units of the sampling step.
const RADIUS: i32 = 6;
/// Sigma of the Gaussian weighting, in units of the sampling step.
const WEIGHT_SIGMA: f32 = 2.5;
/// Width of the sliding orientation window.
const WINDOW: f32 = PI / 3.0;
/// Increment of the sliding window.
const WINDOW_STEP: f32 = 0.15;

/// Compute the dominant gradient orientation around `(x, y)`.
///
/// Gradients are sampled on a disc of radius `6 * step` and weighted by a
/// Gaussian. A window of width π/3 slides around the circle and the direction
/// of the largest summed gradient vector wins. Returns `None` when there is no
/// gradient around the point.
pub fn dominant_orientation(
    gx: &GrayFloatImage,
    gy: &GrayFloatImage,
    x: f32,
    y: f32,
    step: f32,
) -> Option<f32> {
    let mut responses = vec![];
    for j in -RADIUS..=RADIUS {
        for i in -RADIUS..=RADIUS {
            if i * i + j * j >= RADIUS * RADIUS {
                continue;
            }
            let sx = x + i as f32 * step;
            let sy = y + j as f32 * step;
            let (rx, ry) = match (gx.sample(sx, sy), gy.sample(sx, sy)) {
                (Some(rx), Some(ry)) => (rx, ry),
                _ => continue,
            };
            let weight = (-((i * i + j * j) as f32) / (2.0 * WEIGHT_SIGMA * WEIGHT_SIGMA)).exp();
            let (rx, ry) = (weight * rx, weight * ry);
            let mut angle = ry.atan2(rx);
            if angle < 0.0 {
                angle += 2.0 * PI;
            }
            responses.push((angle, rx, ry));
        }
    }

    let mut best: Option<(f32, f32)> = None;
    let mut start = 0.0f32;
    while start < 2.0 * PI {
        let end = start + WINDOW;
        let (sum_x, sum_y) = responses
            .iter()
            .filter(|&&(angle, _, _)| {
                // The window may wrap around 2π.
                (start <= angle && angle < end) || angle + 2.0 * PI < end
            })
            .fold((0.0, 0.0), |(sx, sy), &(_, rx, ry)| (sx + rx, sy + ry));
        let magnitude = sum_x * sum_x + sum_y * sum_y;
        if magnitude > best.map_or(0.0, |(m, _)| m) {
            best = Some((magnitude, sum_y.atan2(sum_x)));
        }
        start += WINDOW_STEP;
    }
    best.map(|(_, angle)| angle)
}

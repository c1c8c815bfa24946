use crate::image::GrayFloatImage;

/// Maps a location on the image of an octave back to the full resolution image.
pub fn to_full_resolution(v: f32, octave: u32) -> f32 {
    let ratio = (1u32 << octave) as f32;
    v * ratio + 0.5 * (ratio - 1.0)
}

/// Maps a full resolution location onto the image of an octave.
pub fn to_octave(v: f32, octave: u32) -> f32 {
    let ratio = (1u32 << octave) as f32;
    (v - 0.5 * (ratio - 1.0)) / ratio
}

/// Grows a margin measured on the first octave so it covers `octaves` octaves.
///
/// Saturates at `usize::MAX`, which [`Tile::expand`](crate::Tile::expand) clamps to the image.
pub fn margin_over_octaves(margin: usize, octaves: u32) -> usize {
    1usize
        .checked_shl(octaves.max(1) - 1)
        .and_then(|factor| margin.checked_mul(factor))
        .unwrap_or(usize::MAX)
}

/// Whether `(x, y)` is strictly greater than its eight neighbours.
///
/// The caller must keep `(x, y)` at least one pixel away from the border.
pub fn is_local_maximum(response: &GrayFloatImage, x: usize, y: usize) -> bool {
    let value = response.get(x, y);
    (y - 1..=y + 1).all(|ny| {
        (x - 1..=x + 1).all(|nx| (nx == x && ny == y) || value > response.get(nx, ny))
    })
}

/// Whether `value` is strictly greater than the 3x3 neighbourhood around `(x, y)` in `other`.
pub fn exceeds_neighbourhood(value: f32, other: &GrayFloatImage, x: usize, y: usize) -> bool {
    (y - 1..=y + 1).all(|ny| (x - 1..=x + 1).all(|nx| value > other.get(nx, ny)))
}

/// Pixels above `threshold` that are strict maxima of their 8-neighbourhood.
///
/// Pixels on the one pixel border are never reported. Output is in row-major order.
pub fn local_maxima(response: &GrayFloatImage, threshold: f32) -> Vec<(usize, usize)> {
    let (w, h) = (response.width(), response.height());
    if w < 3 || h < 3 {
        return vec![];
    }
    let mut maxima = vec![];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            if response.get(x, y) > threshold && is_local_maximum(response, x, y) {
                maxima.push((x, y));
            }
        }
    }
    maxima
}

/// Fits a 2D quadratic to the 3x3 neighbourhood of `(x, y)` and returns the location of its peak.
///
/// Returns `None` when the fit is singular or the peak is more than one pixel away.
pub fn refine(response: &GrayFloatImage, x: usize, y: usize) -> Option<(f32, f32)> {
    let at = |dx: isize, dy: isize| {
        response.get((x as isize + dx) as usize, (y as isize + dy) as usize)
    };
    let x_i = at(0, 0);
    let x_p = at(1, 0);
    let x_m = at(-1, 0);
    let y_p = at(0, 1);
    let y_m = at(0, -1);
    // Derivative
    let d_x = 0.5 * (x_p - x_m);
    let d_y = 0.5 * (y_p - y_m);
    // Hessian
    let d_xx = x_p + x_m - 2.0 * x_i;
    let d_yy = y_p + y_m - 2.0 * x_i;
    let d_xy = 0.25 * (at(1, 1) + at(-1, -1)) - 0.25 * (at(1, -1) + at(-1, 1));
    #[allow(clippy::suspicious_operation_groupings)]
    let det = d_xx * d_yy - d_xy * d_xy;
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv_det = det.recip();
    let dst = (
        -(d_x * d_yy - d_y * d_xy) * inv_det,
        -(d_y * d_xx - d_x * d_xy) * inv_det,
    );
    if dst.0.abs() <= 1.0 && dst.1.abs() <= 1.0 {
        Some((x as f32 + dst.0, y as f32 + dst.1))
    } else {
        None
    }
}

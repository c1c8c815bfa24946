use crate::derivatives::{scharr_horizontal, scharr_vertical};
use crate::extrema::{
    exceeds_neighbourhood, is_local_maximum, margin_over_octaves, refine, to_full_resolution,
};
use crate::image::{gaussian_blur, gaussian_radius, GrayFloatImage};
use crate::orientation::dominant_orientation;
use crate::Detector;
use align_core::InterestPoint;
use log::*;
use ndarray::azip;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Blur already present in a decoded image.
const INITIAL_SIGMA: f32 = 0.5;
/// Octaves whose smaller side would drop below this many pixels are not built.
const MIN_OCTAVE_DIMENSION: usize = 16;

/// Scale-space determinant of Hessian blob detector.
///
/// Each octave of a 2x pyramid is smoothed to `sublevels + 2` Gaussian levels
/// with sigmas `base_sigma * 2^(s / sublevels)`. Points are strict maxima of the
/// scale-normalized response `σ⁴ (Lxx Lyy - Lxy²)` among their 8 neighbours and
/// the 3x3 neighbourhoods of the adjacent levels. Every point gets a dominant
/// orientation.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Hessian {
    /// Minimum scale-normalized response of a point.
    ///
    /// Default is `1e-4`.
    pub threshold: f32,
    /// Number of pyramid octaves.
    ///
    /// Default is `4`.
    pub octaves: u32,
    /// Number of detection levels per octave.
    ///
    /// Default is `3`.
    pub sublevels: u32,
    /// Sigma of the first level of each octave.
    ///
    /// Default is `1.6`.
    pub base_sigma: f32,
}

impl Default for Hessian {
    fn default() -> Hessian {
        Hessian {
            threshold: 1e-4,
            octaves: 4,
            sublevels: 3,
            base_sigma: 1.6,
        }
    }
}

/// One level of the scale space.
#[derive(Debug)]
#[allow(non_snake_case)]
struct Level {
    /// Sigma in pixels of the octave.
    sigma: f32,
    /// First order spatial derivative
    Lx: GrayFloatImage,
    /// First order spatial derivative
    Ly: GrayFloatImage,
    /// Scale-normalized detector response
    Ldet: GrayFloatImage,
}

impl Hessian {
    fn sublevels(&self) -> u32 {
        self.sublevels.max(1)
    }

    fn level_sigma(&self, sublevel: u32) -> f32 {
        self.base_sigma * 2f32.powf(sublevel as f32 / self.sublevels() as f32)
    }

    /// Builds the levels of one octave from its base image, which carries `base_blur`.
    #[allow(non_snake_case)]
    fn build_octave(&self, base: &GrayFloatImage, base_blur: f32) -> Vec<Level> {
        let process_level = |sublevel: u32| {
            let sigma = self.level_sigma(sublevel);
            let extra = (sigma * sigma - base_blur * base_blur).max(0.0).sqrt();
            let smoothed = if extra > 1e-3 {
                gaussian_blur(base, extra)
            } else {
                base.clone()
            };
            let Lx = scharr_horizontal(&smoothed);
            let Ly = scharr_vertical(&smoothed);
            let Lxx = scharr_horizontal(&Lx);
            let Lyy = scharr_vertical(&Ly);
            let Lxy = scharr_vertical(&Lx);
            let sigma_quat = sigma.powi(4);
            let mut Ldet = GrayFloatImage::new(base.width(), base.height());
            azip!((
                Ldet in Ldet.mut_array2(),
                &Lxx in Lxx.ref_array2(),
                &Lyy in Lyy.ref_array2(),
                &Lxy in Lxy.ref_array2(),
            ) {
                *Ldet = (Lxx * Lyy - Lxy * Lxy) * sigma_quat;
            });
            Level { sigma, Lx, Ly, Ldet }
        };
        let sublevels = 0..self.sublevels() + 2;
        #[cfg(not(feature = "rayon"))]
        let levels: Vec<Level> = sublevels.map(process_level).collect();
        #[cfg(feature = "rayon")]
        let levels: Vec<Level> = sublevels.into_par_iter().map(process_level).collect();
        levels
    }

    /// The base image blurred to twice the base sigma, which seeds the next octave.
    fn build_seed(&self, base: &GrayFloatImage, base_blur: f32) -> GrayFloatImage {
        let sigma = 2.0 * self.base_sigma;
        let extra = (sigma * sigma - base_blur * base_blur).max(0.0).sqrt();
        gaussian_blur(base, extra)
    }

    fn detect_octave(&self, levels: &[Level], octave: u32) -> Vec<InterestPoint> {
        let mut points = vec![];
        for s in 1..levels.len() - 1 {
            let (below, level, above) = (&levels[s - 1], &levels[s], &levels[s + 1]);
            let response = &level.Ldet;
            let (w, h) = (response.width(), response.height());
            for y in 1..h - 1 {
                for x in 1..w - 1 {
                    let value = response.get(x, y);
                    if value <= self.threshold
                        || !is_local_maximum(response, x, y)
                        || !exceeds_neighbourhood(value, &below.Ldet, x, y)
                        || !exceeds_neighbourhood(value, &above.Ldet, x, y)
                    {
                        continue;
                    }
                    let (rx, ry) = match refine(response, x, y) {
                        Some(refined) => refined,
                        None => continue,
                    };
                    let orientation = dominant_orientation(&level.Lx, &level.Ly, rx, ry, level.sigma);
                    points.push(InterestPoint {
                        x: to_full_resolution(rx, octave),
                        y: to_full_resolution(ry, octave),
                        scale: level.sigma * (1u32 << octave) as f32,
                        octave,
                        orientation,
                        response: value,
                    });
                }
            }
        }
        debug!("Octave {}: {} scale space extrema.", octave, points.len());
        points
    }
}

impl Detector for Hessian {
    fn detect(&self, image: &GrayFloatImage) -> Vec<InterestPoint> {
        let mut points = vec![];
        let mut base = image.clone();
        let mut base_blur = INITIAL_SIGMA;
        for octave in 0..self.octaves.max(1) {
            if base.width().min(base.height()) < MIN_OCTAVE_DIMENSION {
                break;
            }
            let levels = self.build_octave(&base, base_blur);
            points.extend(self.detect_octave(&levels, octave));
            let seed = self.build_seed(&base, base_blur);
            base = seed.half_size();
            base_blur = self.base_sigma;
        }
        crate::sort_by_response(&mut points);
        points
    }

    fn margin(&self) -> usize {
        let widest = self.level_sigma(self.sublevels() + 1);
        margin_over_octaves(gaussian_radius(widest) + 4, self.octaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(cx: f32, cy: f32, radius: f32) -> GrayFloatImage {
        GrayFloatImage::from_fn(96, 96, |x, y| {
            let (dx, dy) = (x as f32 - cx, y as f32 - cy);
            (-(dx * dx + dy * dy) / (2.0 * radius * radius)).exp()
        })
    }

    #[test]
    fn finds_gaussian_blob() {
        let points = Hessian::default().detect(&blob(48.0, 40.0, 4.0));
        assert!(!points.is_empty());
        let best = points[0];
        assert!((best.x - 48.0).abs() < 1.0, "{:?}", best);
        assert!((best.y - 40.0).abs() < 1.0, "{:?}", best);
        assert!(best.scale > 2.0 && best.scale < 8.0, "{:?}", best);
    }

    #[test]
    fn larger_blob_has_larger_scale() {
        let small = Hessian::default().detect(&blob(48.0, 48.0, 3.0))[0];
        let large = Hessian::default().detect(&blob(48.0, 48.0, 6.0))[0];
        assert!(large.scale > small.scale);
    }

    #[test]
    fn flat_image_has_no_points() {
        let flat = GrayFloatImage::from_fn(64, 64, |_, _| 0.25);
        assert!(Hessian::default().detect(&flat).is_empty());
    }

    #[test]
    fn small_image_is_skipped() {
        let small = GrayFloatImage::from_fn(8, 8, |x, y| (x * y) as f32);
        assert!(Hessian::default().detect(&small).is_empty());
    }
}

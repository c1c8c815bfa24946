use crate::derivatives::{scharr_horizontal, scharr_vertical};
use crate::extrema::{local_maxima, margin_over_octaves, refine, to_full_resolution};
use crate::image::{gaussian_blur, gaussian_radius, GrayFloatImage};
use crate::Detector;
use align_core::InterestPoint;
use log::*;
use ndarray::azip;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Multi-octave Harris corner detector.
///
/// The structure tensor of the smoothed image is integrated with a Gaussian and
/// the corner response `det - k * trace²` is searched for strict local maxima on
/// every octave of a 2x pyramid.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Harris {
    /// Minimum corner response of a point.
    ///
    /// Default is `1e-6`.
    pub threshold: f32,
    /// Weight of the squared trace in the response.
    ///
    /// Default is `0.04`.
    pub k: f32,
    /// Sigma of the smoothing applied before taking gradients.
    ///
    /// Default is `1.5`.
    pub derivative_sigma: f32,
    /// Sigma of the window the structure tensor is integrated over.
    ///
    /// Default is `2.0`.
    pub integration_sigma: f32,
    /// Number of pyramid octaves searched.
    ///
    /// Default is `2`.
    pub octaves: u32,
}

impl Default for Harris {
    fn default() -> Harris {
        Harris {
            threshold: 1e-6,
            k: 0.04,
            derivative_sigma: 1.5,
            integration_sigma: 2.0,
            octaves: 2,
        }
    }
}

impl Harris {
    /// A detector with the default parameters and the given response threshold.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Context needed by a single octave.
    fn octave_margin(&self) -> usize {
        gaussian_radius(self.derivative_sigma)
            + 1
            + gaussian_radius(self.integration_sigma)
            + 2
    }

    /// The corner response of every pixel of `image`.
    #[allow(non_snake_case)]
    pub fn response(&self, image: &GrayFloatImage) -> GrayFloatImage {
        let smoothed = gaussian_blur(image, self.derivative_sigma);
        let Lx = scharr_horizontal(&smoothed);
        let Ly = scharr_vertical(&smoothed);
        let mut Lxx = GrayFloatImage::new(image.width(), image.height());
        let mut Lxy = GrayFloatImage::new(image.width(), image.height());
        let mut Lyy = GrayFloatImage::new(image.width(), image.height());
        azip!((
            xx in Lxx.mut_array2(),
            xy in Lxy.mut_array2(),
            yy in Lyy.mut_array2(),
            &x in Lx.ref_array2(),
            &y in Ly.ref_array2(),
        ) {
            *xx = x * x;
            *xy = x * y;
            *yy = y * y;
        });
        let Lxx = gaussian_blur(&Lxx, self.integration_sigma);
        let Lxy = gaussian_blur(&Lxy, self.integration_sigma);
        let Lyy = gaussian_blur(&Lyy, self.integration_sigma);
        let mut response = GrayFloatImage::new(image.width(), image.height());
        let k = self.k;
        azip!((
            r in response.mut_array2(),
            &xx in Lxx.ref_array2(),
            &xy in Lxy.ref_array2(),
            &yy in Lyy.ref_array2(),
        ) {
            let trace = xx + yy;
            *r = xx * yy - xy * xy - k * trace * trace;
        });
        response
    }

    fn detect_octave(&self, image: &GrayFloatImage, octave: u32) -> Vec<InterestPoint> {
        let response = self.response(image);
        let maxima = local_maxima(&response, self.threshold);
        let points = maxima
            .iter()
            .filter_map(|&(x, y)| {
                let (rx, ry) = refine(&response, x, y)?;
                Some(InterestPoint {
                    x: to_full_resolution(rx, octave),
                    y: to_full_resolution(ry, octave),
                    scale: self.integration_sigma * (1u32 << octave) as f32,
                    octave,
                    orientation: None,
                    response: response.get(x, y),
                })
            })
            .collect::<Vec<_>>();
        debug!(
            "Octave {}: {}/{} maxima remain after subpixel refinement.",
            octave,
            points.len(),
            maxima.len()
        );
        points
    }
}

impl Detector for Harris {
    fn detect(&self, image: &GrayFloatImage) -> Vec<InterestPoint> {
        let mut points = vec![];
        let mut level = image.clone();
        for octave in 0..self.octaves.max(1) {
            if level.width() < 3 || level.height() < 3 {
                break;
            }
            points.extend(self.detect_octave(&level, octave));
            level = level.half_size();
        }
        crate::sort_by_response(&mut points);
        points
    }

    fn margin(&self) -> usize {
        margin_over_octaves(self.octave_margin(), self.octaves)
    }
}

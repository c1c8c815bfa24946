use crate::FeatureMatch;
use derive_more::{AsRef, Deref, Into};
use nalgebra::{Matrix3, Point2, Similarity2, Vector2};
use sample_consensus::Model;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Tolerance used by [`Similarity::from_matrix`] to decide whether the
/// upper-left block is a scaled rotation.
const MATRIX_EPSILON: f64 = 1e-9;

/// A 2d similarity: uniform scale, rotation and translation.
///
/// The wrapped transform maps points of the image being aligned into the frame
/// of the reference image. It can only be built through checked constructors,
/// so its scale is always finite and strictly positive and it is always
/// invertible.
#[derive(Debug, Clone, Copy, PartialEq, AsRef, Deref, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Similarity(Similarity2<f64>);

impl Similarity {
    /// Creates the similarity `p -> scale * R(angle) * p + translation`.
    ///
    /// Returns `None` if any parameter is not finite or the scale is not positive.
    pub fn new(scale: f64, angle: f64, translation: Vector2<f64>) -> Option<Self> {
        let finite =
            scale.is_finite() && angle.is_finite() && translation.iter().all(|v| v.is_finite());
        if !finite || scale <= 0.0 {
            return None;
        }
        Some(Self(Similarity2::new(translation, angle, scale)))
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self(Similarity2::identity())
    }

    /// Recovers a similarity from a 3x3 homogeneous matrix.
    ///
    /// Returns `None` if the matrix is not of the form
    /// `[[s*c, -s*n, tx], [s*n, s*c, ty], [0, 0, 1]]`.
    pub fn from_matrix(matrix: &Matrix3<f64>) -> Option<Self> {
        let a = matrix[(0, 0)];
        let b = matrix[(1, 0)];
        let close =
            |x: f64, y: f64| (x - y).abs() <= MATRIX_EPSILON * (1.0 + x.abs().max(y.abs()));
        let is_similarity = close(matrix[(0, 1)], -b)
            && close(matrix[(1, 1)], a)
            && close(matrix[(2, 0)], 0.0)
            && close(matrix[(2, 1)], 0.0)
            && close(matrix[(2, 2)], 1.0);
        if !is_similarity {
            return None;
        }
        Self::new(
            a.hypot(b),
            b.atan2(a),
            Vector2::new(matrix[(0, 2)], matrix[(1, 2)]),
        )
    }

    /// The uniform scale factor.
    pub fn scale(&self) -> f64 {
        self.0.scaling()
    }

    /// The rotation angle in radians, in `(-pi, pi]`.
    pub fn angle(&self) -> f64 {
        self.0.isometry.rotation.angle()
    }

    /// The translation applied after scaling and rotating.
    pub fn translation(&self) -> Vector2<f64> {
        self.0.isometry.translation.vector
    }

    /// The inverse mapping.
    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Maps a point through the transform.
    pub fn transform_point(&self, point: &Point2<f64>) -> Point2<f64> {
        self.0.transform_point(point)
    }

    /// The transform as a 3x3 homogeneous matrix.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        self.0.to_homogeneous()
    }
}

impl Default for Similarity {
    fn default() -> Self {
        Self::identity()
    }
}

impl Model<FeatureMatch<Point2<f64>>> for Similarity {
    /// The re-projection distance in pixels of the source point onto its target.
    fn residual(&self, data: &FeatureMatch<Point2<f64>>) -> f64 {
        let &FeatureMatch(source, target) = data;
        (self.transform_point(&source) - target).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn example() -> Similarity {
        Similarity::new(1.2, 10f64.to_radians(), Vector2::new(5.0, 5.0)).unwrap()
    }

    #[test]
    fn rejects_degenerate_scale() {
        assert!(Similarity::new(0.0, 0.0, Vector2::zeros()).is_none());
        assert!(Similarity::new(-1.0, 0.0, Vector2::zeros()).is_none());
        assert!(Similarity::new(f64::NAN, 0.0, Vector2::zeros()).is_none());
        assert!(Similarity::new(1.0, 0.0, Vector2::new(f64::INFINITY, 0.0)).is_none());
    }

    #[test]
    fn parameters() {
        let transform = example();
        assert_relative_eq!(transform.scale(), 1.2, epsilon = 1e-12);
        assert_relative_eq!(transform.angle(), PI / 18.0, epsilon = 1e-12);
        assert_relative_eq!(transform.translation(), Vector2::new(5.0, 5.0), epsilon = 1e-12);
    }

    #[test]
    fn inverse_round_trip() {
        let transform = example();
        let point = Point2::new(-31.0, 212.5);
        let back = transform.inverse().transform_point(&transform.transform_point(&point));
        assert_relative_eq!(back, point, epsilon = 1e-9);
    }

    #[test]
    fn matrix_round_trip() {
        let transform = example();
        let matrix = transform.to_matrix();
        assert_relative_eq!(matrix[(2, 2)], 1.0);
        let recovered = Similarity::from_matrix(&matrix).unwrap();
        assert_relative_eq!(recovered.scale(), transform.scale(), epsilon = 1e-12);
        assert_relative_eq!(recovered.angle(), transform.angle(), epsilon = 1e-12);
        assert_relative_eq!(recovered.translation(), transform.translation(), epsilon = 1e-12);
    }

    #[test]
    fn from_matrix_rejects_shear() {
        let mut matrix = example().to_matrix();
        matrix[(0, 1)] += 0.1;
        assert!(Similarity::from_matrix(&matrix).is_none());
    }

    #[test]
    fn residual_is_reprojection_distance() {
        let transform = Similarity::new(1.0, 0.0, Vector2::new(3.0, 4.0)).unwrap();
        let exact = FeatureMatch(Point2::new(1.0, 1.0), Point2::new(4.0, 5.0));
        let off = FeatureMatch(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0));
        assert_relative_eq!(transform.residual(&exact), 0.0);
        assert_relative_eq!(transform.residual(&off), 5.0);
    }
}

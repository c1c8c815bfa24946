use crate::InterestPoint;
use derive_more::{AsRef, Deref, From, Into};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A fixed-length numeric summary of the local appearance around a point.
///
/// Every descriptor produced by one extractor configuration has the same length.
#[derive(Debug, Clone, PartialEq, AsRef, Deref, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Descriptor(pub Vec<f32>);

impl Descriptor {
    /// Squared Euclidean distance to another descriptor of the same length.
    pub fn distance_squared(&self, other: &Descriptor) -> f32 {
        debug_assert_eq!(self.0.len(), other.0.len());
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// Euclidean (L2) distance to another descriptor of the same length.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// An interest point together with the descriptor computed for it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Feature {
    pub point: InterestPoint,
    pub descriptor: Descriptor,
}

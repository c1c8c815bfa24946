#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A putative correspondence between feature `index_a` of image A and
/// feature `index_b` of image B.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Match {
    pub index_a: usize,
    pub index_b: usize,
    /// The descriptor distance that produced the match.
    pub distance: f32,
}

/// A pair of corresponding points: the first is mapped onto the second.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FeatureMatch<P>(pub P, pub P);

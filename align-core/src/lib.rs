//! # Stereo alignment core
//!
//! Common types shared by every crate in the stereo pre-alignment workspace.
//! Detectors produce [`InterestPoint`]s, descriptor extractors pair them with a
//! [`Descriptor`] into a [`Feature`], the matcher relates two feature sets with
//! [`Match`]es, and the consensus process turns [`FeatureMatch`] correspondences
//! into a [`Similarity`].
//!
//! Coordinates follow the image convention used throughout the workspace:
//!
//! ```text
//!   (0, 0) ----------> +x
//!     |
//!     |      pixel (x, y) covers [x - 0.5, x + 0.5]
//!     |
//!     v
//!    +y
//! ```
//!
//! A [`Similarity`] always maps coordinates of the image being aligned (`B`)
//! into the frame of the reference image (`A`).

mod feature;
mod keypoint;
mod matches;
mod similarity;

pub use feature::*;
pub use keypoint::*;
pub use matches::*;
pub use nalgebra;
pub use sample_consensus;
pub use similarity::*;

use std::fmt;

/// Which image of the pair a stage was working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The reference image (A).
    Left,
    /// The image being aligned (B).
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Everything that can stop an alignment.
///
/// Insufficient data is always fatal: there is no partial output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the {image} image has {found} usable features, at least {required} are needed")]
    InsufficientFeatures {
        image: Side,
        found: usize,
        required: usize,
    },
    #[error("found {found} matches, at least {required} are needed to fit a transform")]
    InsufficientMatches { found: usize, required: usize },
    #[error(
        "no transform is supported by {required} of {matches} matches after {iterations} iterations, the best had {best_inliers}"
    )]
    FittingFailed {
        best_inliers: usize,
        required: usize,
        matches: usize,
        iterations: usize,
    },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed matrix file: {0}")]
    MatrixFormat(String),
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

impl Error {
    /// Maps a consensus failure onto the pipeline's taxonomy.
    pub(crate) fn from_consensus(error: ransac::Error, matches: usize) -> Self {
        match error {
            ransac::Error::InsufficientData { found, required } => {
                Error::InsufficientMatches { found, required }
            }
            ransac::Error::NoConsensus {
                best,
                required,
                iterations,
            } => Error::FittingFailed {
                best_inliers: best,
                required,
                matches,
                iterations,
            },
        }
    }
}

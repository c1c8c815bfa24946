//! Persistence of an alignment: the transform as a text matrix and the image pair as TIFFs.
//!
//! The matrix file holds a `rows cols` header line followed by one whitespace
//! separated row per line:
//!
//! ```text
//! 3 3
//! 0.9961946980917455 -0.08715574274765817 3
//! 0.08715574274765817 0.9961946980917455 3
//! 0 0 1
//! ```

use crate::warp::Rescale;
use crate::{Alignment, Error};
use align_core::nalgebra::Matrix3;
use align_core::Similarity;
use log::*;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The file written for each part of an alignment, given the output prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub matrix: PathBuf,
    pub reference: PathBuf,
    pub warped: PathBuf,
}

impl OutputPaths {
    /// `<prefix>-align.txt`, `<prefix>-L.tif` and `<prefix>-R.tif`.
    pub fn new(prefix: impl AsRef<Path>) -> Self {
        let with_suffix = |suffix: &str| {
            let mut name = OsString::from(prefix.as_ref().as_os_str());
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            matrix: with_suffix("-align.txt"),
            reference: with_suffix("-L.tif"),
            warped: with_suffix("-R.tif"),
        }
    }
}

pub fn format_matrix(matrix: &Matrix3<f64>) -> String {
    let mut text = String::from("3 3\n");
    for row in matrix.row_iter() {
        let row = row.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    text
}

pub fn parse_matrix(text: &str) -> Result<Matrix3<f64>, Error> {
    let mut tokens = text.split_whitespace();
    let mut dimension = || -> Result<usize, Error> {
        let token = tokens
            .next()
            .ok_or_else(|| Error::MatrixFormat("missing dimensions".to_owned()))?;
        token
            .parse()
            .map_err(|_| Error::MatrixFormat(format!("bad dimension {:?}", token)))
    };
    let (rows, cols) = (dimension()?, dimension()?);
    if (rows, cols) != (3, 3) {
        return Err(Error::MatrixFormat(format!(
            "expected a 3x3 matrix, found {}x{}",
            rows, cols
        )));
    }
    let values = tokens
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| Error::MatrixFormat(format!("bad value {:?}", token)))
        })
        .collect::<Result<Vec<f64>, Error>>()?;
    if values.len() != 9 {
        return Err(Error::MatrixFormat(format!(
            "expected 9 values, found {}",
            values.len()
        )));
    }
    Ok(Matrix3::from_row_slice(&values))
}

pub fn write_matrix(path: impl AsRef<Path>, matrix: &Matrix3<f64>) -> Result<(), Error> {
    std::fs::write(path, format_matrix(matrix))?;
    Ok(())
}

pub fn read_matrix(path: impl AsRef<Path>) -> Result<Matrix3<f64>, Error> {
    parse_matrix(&std::fs::read_to_string(path)?)
}

/// Reads a matrix file and checks that it holds a similarity.
pub fn read_transform(path: impl AsRef<Path>) -> Result<Similarity, Error> {
    let matrix = read_matrix(path)?;
    Similarity::from_matrix(&matrix)
        .ok_or_else(|| Error::MatrixFormat("the matrix is not a similarity".to_owned()))
}

/// Writes the transform and both images of `alignment` next to `prefix`.
pub fn export(
    prefix: impl AsRef<Path>,
    alignment: &Alignment,
    rescale: &Rescale,
) -> Result<OutputPaths, Error> {
    let paths = OutputPaths::new(prefix);
    write_matrix(&paths.matrix, &alignment.transform.to_matrix())?;
    let images = rescale.apply(&[&alignment.reference, &alignment.warped]);
    for (image, path) in images.iter().zip([&paths.reference, &paths.warped]) {
        image.save(path)?;
    }
    info!(
        "Wrote {}, {} and {}.",
        paths.matrix.display(),
        paths.reference.display(),
        paths.warped.display()
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::nalgebra::Vector2;

    #[test]
    fn prefix_naming() {
        let paths = OutputPaths::new("out/pair.v1");
        assert_eq!(paths.matrix, PathBuf::from("out/pair.v1-align.txt"));
        assert_eq!(paths.reference, PathBuf::from("out/pair.v1-L.tif"));
        assert_eq!(paths.warped, PathBuf::from("out/pair.v1-R.tif"));
    }

    #[test]
    fn format_is_row_major_with_header() {
        let matrix = Matrix3::new(2.0, 0.0, 3.0, 0.0, 2.0, -4.5, 0.0, 0.0, 1.0);
        assert_eq!(format_matrix(&matrix), "3 3\n2 0 3\n0 2 -4.5\n0 0 1\n");
    }

    #[test]
    fn parse_round_trips_exactly() {
        let matrix = Similarity::new(1.2, 10f64.to_radians(), Vector2::new(5.0, 5.0))
            .unwrap()
            .to_matrix();
        assert_eq!(parse_matrix(&format_matrix(&matrix)).unwrap(), matrix);
    }

    #[test]
    fn parse_rejects_malformed_text() {
        for text in [
            "",
            "3",
            "2 2\n1 0\n0 1\n",
            "3 3\n1 0 0\n0 1 0\n0 0\n",
            "3 3\n1 0 0\n0 1 0\n0 0 1 7\n",
            "3 3\n1 0 0\n0 x 0\n0 0 1\n",
        ] {
            assert!(
                matches!(parse_matrix(text), Err(Error::MatrixFormat(_))),
                "accepted {:?}",
                text
            );
        }
    }
}

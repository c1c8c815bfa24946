use crate::{Detector, GrayFloatImage};
use align_core::InterestPoint;
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// An axis aligned rectangle of pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Tile {
    /// Whether a sub-pixel location lies in the pixels covered by this tile.
    ///
    /// Pixel `i` covers `[i - 0.5, i + 0.5)`, so every location of the image
    /// belongs to exactly one tile of a [`Tiles`] partition.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let (x, y) = (x + 0.5, y + 0.5);
        x >= self.x as f32
            && x < (self.x + self.width) as f32
            && y >= self.y as f32
            && y < (self.y + self.height) as f32
    }

    /// Grows the tile by `margin` pixels on each side, clamped to a `width` x `height` image.
    pub fn expand(&self, margin: usize, width: usize, height: usize) -> Tile {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        Tile {
            x,
            y,
            width: (self.x + self.width).saturating_add(margin).min(width) - x,
            height: (self.y + self.height).saturating_add(margin).min(height) - y,
        }
    }
}

/// A lazy, restartable partition of an image into tiles no larger than a maximum dimension.
///
/// Each axis of length `L` is split into `ceil(L / max_dimension)` nearly equal parts.
/// Tiles are produced row by row and never overlap.
#[derive(Debug, Clone)]
pub struct Tiles {
    width: usize,
    height: usize,
    columns: usize,
    rows: usize,
    next: usize,
}

impl Tiles {
    /// A `max_dimension` of zero is treated as one.
    pub fn new(width: usize, height: usize, max_dimension: usize) -> Self {
        let max_dimension = max_dimension.max(1);
        Self {
            width,
            height,
            columns: (width + max_dimension - 1) / max_dimension,
            rows: (height + max_dimension - 1) / max_dimension,
            next: 0,
        }
    }
}

/// Start and length of part `index` when `length` is split into `parts` nearly equal parts.
fn split(length: usize, parts: usize, index: usize) -> (usize, usize) {
    let start = index * length / parts;
    let end = (index + 1) * length / parts;
    (start, end - start)
}

impl Iterator for Tiles {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.next >= self.columns * self.rows {
            return None;
        }
        let (x, width) = split(self.width, self.columns, self.next % self.columns);
        let (y, height) = split(self.height, self.rows, self.next / self.columns);
        self.next += 1;
        Some(Tile {
            x,
            y,
            width,
            height,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.columns * self.rows - self.next.min(self.columns * self.rows);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Tiles {}

/// Runs a detector tile by tile to bound the size of the intermediate images.
///
/// Each tile is expanded by the detector's [`Detector::margin`] before detection
/// so that responses near tile seams see the same neighbourhood as they would on
/// the whole image. Points are kept only by the tile that owns their location.
#[derive(Debug, Clone, Copy)]
pub struct Tiled<D> {
    pub detector: D,
    pub max_dimension: usize,
}

impl<D> Tiled<D> {
    pub fn new(detector: D, max_dimension: usize) -> Self {
        Self {
            detector,
            max_dimension,
        }
    }
}

impl<D: Detector> Tiled<D> {
    fn detect_tile(&self, image: &GrayFloatImage, tile: Tile) -> Vec<InterestPoint> {
        let region = tile.expand(self.detector.margin(), image.width(), image.height());
        trace!("Detecting in tile {:?} with context {:?}.", tile, region);
        let crop = image.crop(region.x, region.y, region.width, region.height);
        self.detector
            .detect(&crop)
            .into_iter()
            .map(|mut point| {
                point.x += region.x as f32;
                point.y += region.y as f32;
                point
            })
            .filter(|point| tile.contains(point.x, point.y))
            .collect()
    }
}

impl<D: Detector> Detector for Tiled<D> {
    fn detect(&self, image: &GrayFloatImage) -> Vec<InterestPoint> {
        let tiles = Tiles::new(image.width(), image.height(), self.max_dimension);
        debug!(
            "Detecting a {}x{} image in {} tiles.",
            image.width(),
            image.height(),
            tiles.len()
        );
        #[cfg(not(feature = "rayon"))]
        let mut points: Vec<InterestPoint> = tiles
            .flat_map(|tile| self.detect_tile(image, tile))
            .collect();
        #[cfg(feature = "rayon")]
        let mut points: Vec<InterestPoint> = tiles
            .collect::<Vec<_>>()
            .into_par_iter()
            .flat_map_iter(|tile| self.detect_tile(image, tile))
            .collect();
        crate::sort_by_response(&mut points);
        points
    }

    fn margin(&self) -> usize {
        self.detector.margin()
    }
}

use derive_more::{Deref, DerefMut};
use image::{DynamicImage, ImageBuffer, Luma, Pixel};
use log::*;
use ndarray::{azip, s, Array2, ArrayView2, ArrayViewMut2};
use std::f32;
use wide::f32x4;

pub type GrayImageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// The single channel floating point image every stage of the pipeline works on.
///
/// This is a thin wrapper over the image crate's buffer so that loading and saving
/// stay with the image crate, while filters and sampling can work on the raw
/// contiguous row-major `f32` data (or an `ndarray` view of it) directly.
/// Pixel values of decoded images are in `[0, 1]`.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GrayFloatImage(pub GrayImageBuffer);

impl GrayFloatImage {
    /// Create a unit float image from the image crate's DynamicImage type.
    ///
    /// Colour images are reduced to their luma channel.
    ///
    /// # Arguments
    /// * `input_image` - the input image.
    /// # Return value
    /// An image with pixel values between 0 and 1.
    pub fn from_dynamic(input_image: &DynamicImage) -> Self {
        let (width, height) = (input_image.width(), input_image.height());
        Self(match input_image.grayscale() {
            DynamicImage::ImageLuma8(gray_image) => {
                info!("Loaded a {} x {} 8-bit image", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([f32::from(gray_image[(x, y)][0]) / 255f32])
                })
            }
            DynamicImage::ImageLumaA8(gray_image) => {
                info!("Loaded a {} x {} 8-bit image with alpha", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([f32::from(gray_image[(x, y)][0]) / 255f32])
                })
            }
            DynamicImage::ImageLuma16(gray_image) => {
                info!("Loaded a {} x {} 16-bit image", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([f32::from(gray_image[(x, y)][0]) / 65535f32])
                })
            }
            DynamicImage::ImageRgb32F(float_image) => {
                info!("Loaded a {} x {} 32-bit RGB float image", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([float_image[(x, y)].to_luma()[0]])
                })
            }
            DynamicImage::ImageRgba32F(float_image) => {
                info!("Loaded a {} x {} 32-bit RGBA float image", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([float_image[(x, y)].to_luma()[0]])
                })
            }
            other => {
                info!("Loaded a {} x {} image, reducing to 16-bit luma", width, height);
                let gray_image = other.to_luma16();
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([f32::from(gray_image[(x, y)][0]) / 65535f32])
                })
            }
        })
    }

    pub fn from_array2(arr: Array2<f32>) -> Self {
        let (height, width) = arr.dim();
        let data = if arr.is_standard_layout() {
            arr.into_raw_vec()
        } else {
            arr.iter().copied().collect()
        };
        Self(
            ImageBuffer::from_raw(width as u32, height as u32, data)
                .expect("raw vector didn't have enough pixels for the image"),
        )
    }

    /// Builds an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        Self(ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            Luma([f(x as usize, y as usize)])
        }))
    }

    pub fn ref_array2(&self) -> ArrayView2<f32> {
        ArrayView2::from_shape((self.height(), self.width()), self.0.as_raw().as_slice())
            .expect("image buffer is always height x width")
    }

    pub fn mut_array2(&mut self) -> ArrayViewMut2<f32> {
        let shape = (self.height(), self.width());
        ArrayViewMut2::from_shape(shape, &mut *self.0)
            .expect("image buffer is always height x width")
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn new(width: usize, height: usize) -> Self {
        Self(ImageBuffer::from_pixel(
            width as u32,
            height as u32,
            Luma([0.0]),
        ))
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.0.as_raw()[y * self.width() + x]
    }

    pub fn put(&mut self, x: usize, y: usize, pixel_value: f32) {
        let width = self.width();
        let data: &mut [f32] = &mut self.0;
        data[y * width + x] = pixel_value;
    }

    /// Bilinear interpolation at a sub-pixel location.
    ///
    /// Returns `None` when the location is outside `[0, width - 1] x [0, height - 1]`.
    pub fn sample(&self, x: f32, y: f32) -> Option<f32> {
        let max_x = self.width().checked_sub(1)? as f32;
        let max_y = self.height().checked_sub(1)? as f32;
        if !(0.0..=max_x).contains(&x) || !(0.0..=max_y).contains(&y) {
            return None;
        }
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width() - 1);
        let y1 = (y0 + 1).min(self.height() - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x1, y0) * fx;
        let bottom = self.get(x0, y1) * (1.0 - fx) + self.get(x1, y1) * fx;
        Some(top * (1.0 - fy) + bottom * fy)
    }

    /// Copies out the `width` x `height` region whose top-left corner is `(x, y)`.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> Self {
        let region = self
            .ref_array2()
            .slice(s![y..y + height, x..x + width])
            .to_owned();
        Self::from_array2(region)
    }

    /// The smallest and largest pixel values, or `None` for an empty image.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.0.as_raw().iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    pub fn half_size(&self) -> Self {
        let width = self.width() / 2;
        let height = self.height() / 2;
        let mut half = Array2::zeros((height, width));

        // Pixel i of the half size image covers pixels 2i and 2i + 1, an odd last row or column is dropped.
        azip!((
            out in &mut half,
            window in self.ref_array2().slice(s![..height * 2, ..width * 2]).exact_chunks((2, 2)),
        ) {
            *out = window.sum() * 0.25;
        });

        Self::from_array2(half)
    }
}

/// Splits a kernel into zero padded 4-lane chunks.
///
/// Returns the chunks and the number of padding elements appended to the kernel.
fn simd_kernel(kernel: &[f32]) -> (Vec<f32x4>, usize) {
    let chunks = kernel
        .chunks(4)
        .map(|chunk| {
            let mut data = [0.0f32; 4];
            data[..chunk.len()].copy_from_slice(chunk);
            f32x4::new(data)
        })
        .collect::<Vec<_>>();
    let padding = 4 * chunks.len() - kernel.len();
    (chunks, padding)
}

/// Dot product of a window with the SIMD kernel. The window must have `4 * kernel.len()` elements.
fn apply_simd_kernel(window: &[f32], kernel: &[f32x4]) -> f32 {
    window
        .chunks_exact(4)
        .map(|chunk| f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .zip(kernel.iter())
        .fold(f32x4::splat(0.), |acc, (a, b)| a.mul_add(*b, acc))
        .reduce_add()
}

/// Convolves every row with `kernel`, replicating edge pixels.
pub fn horizontal_filter(image: &GrayImageBuffer, kernel: &[f32]) -> GrayImageBuffer {
    debug_assert!(kernel.len() % 2 == 1);
    let kernel_half_size = kernel.len() / 2;
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width == 0 || height == 0 {
        return image.clone();
    }
    let mut output = vec![0.0; width * height];
    let (kernel_simd, padding) = simd_kernel(kernel);
    let window_size = kernel.len() + padding;
    let mut scratch = vec![0f32; width + kernel_half_size * 2 + padding];
    for (row_in, row_out) in image
        .as_raw()
        .chunks_exact(width)
        .zip(output.chunks_exact_mut(width))
    {
        // Replicate the edge pixels into the borders of the scratch row.
        scratch[..kernel_half_size].fill(row_in[0]);
        scratch[kernel_half_size..kernel_half_size + width].copy_from_slice(row_in);
        scratch[kernel_half_size + width..2 * kernel_half_size + width].fill(row_in[width - 1]);
        scratch[2 * kernel_half_size + width..].fill(0.);
        for (window, out) in scratch.windows(window_size).zip(row_out) {
            *out = apply_simd_kernel(window, &kernel_simd);
        }
    }
    GrayImageBuffer::from_raw(width as u32, height as u32, output)
        .expect("output has width * height pixels")
}

/// Convolves every column with `kernel`, replicating edge pixels.
pub fn vertical_filter(image: &GrayImageBuffer, kernel: &[f32]) -> GrayImageBuffer {
    debug_assert!(kernel.len() % 2 == 1);
    let kernel_half_size = kernel.len() / 2;
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width == 0 || height == 0 {
        return image.clone();
    }
    let mut output = vec![0.0; width * height];
    let (kernel_simd, padding) = simd_kernel(kernel);
    let window_size = kernel.len() + padding;
    // Columns are gathered in groups that fill a 64 byte cache line.
    const SCRATCH_WIDTH: usize = 16;
    let scratch_height = height + kernel_half_size * 2 + padding;
    let mut scratch = vec![0f32; SCRATCH_WIDTH * scratch_height];
    let pixels = image.as_raw();
    for x_s in (0..width).step_by(SCRATCH_WIDTH) {
        let x_e = (x_s + SCRATCH_WIDTH).min(width);
        for x in x_s..x_e {
            let column = &mut scratch[(x - x_s) * scratch_height..(x - x_s + 1) * scratch_height];
            column[..kernel_half_size].fill(pixels[x]);
            for y in 0..height {
                column[kernel_half_size + y] = pixels[y * width + x];
            }
            column[kernel_half_size + height..2 * kernel_half_size + height]
                .fill(pixels[(height - 1) * width + x]);
            column[2 * kernel_half_size + height..].fill(0.);
        }
        for (dx, column) in scratch
            .chunks(scratch_height)
            .take(x_e - x_s)
            .enumerate()
        {
            for (y, window) in column.windows(window_size).take(height).enumerate() {
                output[y * width + x_s + dx] = apply_simd_kernel(window, &kernel_simd);
            }
        }
    }
    GrayImageBuffer::from_raw(width as u32, height as u32, output)
        .expect("output has width * height pixels")
}

pub fn separable_filter(
    image: &GrayImageBuffer,
    h_kernel: &[f32],
    v_kernel: &[f32],
) -> GrayImageBuffer {
    let h = horizontal_filter(image, h_kernel);
    vertical_filter(&h, v_kernel)
}

/// The Gaussian function.
fn gaussian(x: f32, r: f32) -> f32 {
    ((2.0 * f32::consts::PI).sqrt() * r).recip() * (-x.powi(2) / (2.0 * r.powi(2))).exp()
}

/// Generate a normalized Gaussian kernel.
///
/// # Arguments
/// * `r` - sigma.
/// * `kernel_size` - The size of the kernel, must be odd.
pub fn gaussian_kernel(r: f32, kernel_size: usize) -> Vec<f32> {
    assert!(kernel_size % 2 == 1, "kernel_size must be odd");
    let half_width = (kernel_size / 2) as i32;
    let mut kernel = (-half_width..=half_width)
        .map(|i| gaussian(i as f32, r))
        .collect::<Vec<_>>();
    let sum: f32 = kernel.iter().sum();
    for val in kernel.iter_mut() {
        *val /= sum;
    }
    kernel
}

/// The radius of the kernel used by [`gaussian_blur`] for a given sigma.
pub fn gaussian_radius(r: f32) -> usize {
    (2.0 * r).ceil() as usize
}

/// Perform Gaussian blur on an image.
///
/// # Arguments
/// * `r` - sigma, must be positive.
pub fn gaussian_blur(image: &GrayFloatImage, r: f32) -> GrayFloatImage {
    assert!(r > 0.0, "sigma must be > 0.0");
    let kernel = gaussian_kernel(r, gaussian_radius(r) * 2 + 1);
    GrayFloatImage(separable_filter(image, &kernel, &kernel))
}

#[cfg(test)]
mod tests {
    use super::{gaussian_kernel, GrayFloatImage};
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

    fn textured(width: usize, height: usize) -> GrayFloatImage {
        GrayFloatImage::from_fn(width, height, |x, y| {
            let (x, y) = (x as f32, y as f32);
            0.5 + 0.25 * (x * 0.37).sin() * (y * 0.21).cos() + 0.002 * ((x * y) % 17.0)
        })
    }

    #[test]
    fn gaussian_kernel_correct() {
        // test against known correct kernel
        let kernel = gaussian_kernel(3.0, 7);
        let known_correct_kernel = vec![
            0.1062_8852,
            0.1403_2133,
            0.1657_7007,
            0.1752_4014,
            0.1657_7007,
            0.1403_2133,
            0.1062_8852,
        ];
        for (i, j) in kernel.iter().zip(known_correct_kernel.iter()) {
            assert!(f32::abs(*i - *j) < 0.0001);
        }
    }

    #[test]
    fn horizontal_filter() {
        let image = textured(83, 41);
        let kernel = gaussian_kernel(3.0, 7);
        let filtered_ours = super::horizontal_filter(&image.0, &kernel);
        let filtered_imageproc = imageproc::filter::horizontal_filter(&image.0, &kernel);
        imageproc::assert_pixels_eq_within!(filtered_ours, filtered_imageproc, 0.0001);
    }

    #[test]
    fn vertical_filter() {
        let image = textured(37, 64);
        let kernel = gaussian_kernel(3.0, 7);
        let filtered_ours = super::vertical_filter(&image.0, &kernel);
        let filtered_imageproc = imageproc::filter::vertical_filter(&image.0, &kernel);
        imageproc::assert_pixels_eq_within!(filtered_ours, filtered_imageproc, 0.0001);
    }

    #[test]
    fn from_dynamic_reduces_colour() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 3, Luma([255])));
        let gray = GrayFloatImage::from_dynamic(&gray);
        assert_eq!((gray.width(), gray.height()), (4, 3));
        assert!((gray.get(3, 2) - 1.0).abs() < 1e-6);

        let colour = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 2, Rgb([0, 0, 0])));
        let colour = GrayFloatImage::from_dynamic(&colour);
        assert_eq!((colour.width(), colour.height()), (5, 2));
        assert_eq!(colour.get(0, 0), 0.0);
    }

    #[test]
    fn half_size_averages_blocks() {
        let image = GrayFloatImage::from_fn(5, 4, |x, y| (x + 10 * y) as f32);
        let half = image.half_size();
        assert_eq!((half.width(), half.height()), (2, 2));
        assert_eq!(half.get(0, 0), (0.0 + 1.0 + 10.0 + 11.0) / 4.0);
        assert_eq!(half.get(1, 1), (22.0 + 23.0 + 32.0 + 33.0) / 4.0);
    }

    #[test]
    fn bilinear_sampling() {
        let image = GrayFloatImage::from_fn(3, 3, |x, y| (x + 3 * y) as f32);
        assert_eq!(image.sample(1.0, 1.0), Some(4.0));
        assert_eq!(image.sample(0.5, 0.0), Some(0.5));
        assert_eq!(image.sample(2.0, 2.0), Some(8.0));
        assert!((image.sample(0.25, 1.5).unwrap() - 4.75).abs() < 1e-6);
        assert_eq!(image.sample(-0.01, 1.0), None);
        assert_eq!(image.sample(1.0, 2.01), None);
    }

    #[test]
    fn crop_copies_region() {
        let image = GrayFloatImage::from_fn(6, 5, |x, y| (x + 10 * y) as f32);
        let crop = image.crop(2, 1, 3, 2);
        assert_eq!((crop.width(), crop.height()), (3, 2));
        assert_eq!(crop.get(0, 0), 12.0);
        assert_eq!(crop.get(2, 1), 24.0);
    }
}

//! Resolution normalization between the original image and the working
//! resolution the solvers run at.
//!
//! Continuous rasters (the image, alpha, foreground) go through the `image`
//! crate's bilinear `Triangle` filter. Categorical rasters (masks, trimaps)
//! use nearest-neighbor sampling so no intermediate class value is invented.

use image::{imageops::FilterType, GrayImage, ImageBuffer, Pixel, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of<P: Pixel>(image: &ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self::new(image.width(), image.height())
    }

    /// `(height, width)`, the order used in result bundles
    pub fn height_width(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// `(width, height)`, the order used in error reports
    pub fn width_height(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Compute the working dimensions for `original` so the longest side is at
/// most `max_dim`. The shorter side keeps the aspect ratio, rounded to the
/// nearest pixel and never below 1.
pub fn working_dimensions(original: Dimensions, max_dim: u32) -> Dimensions {
    let max_dim = max_dim.max(1);
    if original.longest_side() <= max_dim {
        return original;
    }

    let scale = |side: u32, long: u32| -> u32 {
        let scaled = (f64::from(side) * f64::from(max_dim) / f64::from(long)).round();
        (scaled as u32).max(1)
    };

    if original.height > original.width {
        Dimensions::new(scale(original.width, original.height), max_dim)
    } else {
        Dimensions::new(max_dim, scale(original.height, original.width))
    }
}

/// Rescale `image` so its longest side is at most `max_dim`.
///
/// Returns the working image and the pre-scale dimensions. Images already
/// within bounds are returned unchanged.
pub fn normalize(image: &RgbImage, max_dim: u32) -> (RgbImage, Dimensions) {
    let original = Dimensions::of(image);
    let working = working_dimensions(original, max_dim);

    if working == original {
        return (image.clone(), original);
    }

    debug!(
        "Resizing {}x{} -> {}x{}",
        original.width, original.height, working.width, working.height
    );
    let resized = image::imageops::resize(image, working.width, working.height, FilterType::Triangle);
    (resized, original)
}

/// Nearest-neighbor resampling for categorical rasters (masks, trimaps).
pub fn resize_nearest(image: &GrayImage, target: Dimensions) -> GrayImage {
    let (current_width, current_height) = image.dimensions();

    if (current_width, current_height) == target.width_height() {
        return image.clone();
    }
    if current_width == 0 || current_height == 0 {
        return GrayImage::new(target.width, target.height);
    }

    let x_ratio = f64::from(current_width) / f64::from(target.width);
    let y_ratio = f64::from(current_height) / f64::from(target.height);

    GrayImage::from_fn(target.width, target.height, |x, y| {
        let src_x = ((f64::from(x) * x_ratio) as u32).min(current_width - 1);
        let src_y = ((f64::from(y) * y_ratio) as u32).min(current_height - 1);
        *image.get_pixel(src_x, src_y)
    })
}

/// Bilinear resampling for continuous rasters (alpha, foreground).
pub fn resize_bilinear<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, target: Dimensions) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    if Dimensions::of(image) == target {
        return image.clone();
    }
    image::imageops::resize(image, target.width, target.height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn test_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([128, 64, 32]))
    }

    #[test]
    fn test_no_resize_when_already_small() {
        let img = test_image(100, 80);
        let (result, original) = normalize(&img, 256);
        assert_eq!(result.dimensions(), (100, 80));
        assert_eq!(original, Dimensions::new(100, 80));
    }

    #[test]
    fn test_no_resize_when_exact_match() {
        let img = test_image(256, 200);
        let (result, _) = normalize(&img, 256);
        assert_eq!(result.dimensions(), (256, 200));
    }

    #[test]
    fn test_resize_landscape() {
        let img = test_image(2000, 1000);
        let (result, original) = normalize(&img, 1024);
        assert_eq!(result.dimensions(), (1024, 512));
        assert_eq!(original.height_width(), (1000, 2000));
    }

    #[test]
    fn test_resize_portrait_rounds_to_nearest() {
        // 333 * 100 / 1000 = 33.3 -> 33, 335 * 100 / 1000 = 33.5 -> 34
        let dims = working_dimensions(Dimensions::new(333, 1000), 100);
        assert_eq!(dims, Dimensions::new(33, 100));
        let dims = working_dimensions(Dimensions::new(335, 1000), 100);
        assert_eq!(dims, Dimensions::new(34, 100));
    }

    #[test]
    fn test_extreme_aspect_ratio_keeps_one_pixel() {
        let dims = working_dimensions(Dimensions::new(5000, 1), 100);
        assert_eq!(dims, Dimensions::new(100, 1));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let img = RgbImage::from_fn(731, 1289, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 7]));
        let (once, _) = normalize(&img, 500);
        let (twice, original) = normalize(&once, 500);
        assert_eq!(once, twice);
        assert_eq!(original, Dimensions::of(&once));
    }

    #[test]
    fn test_resize_nearest_keeps_classes() {
        let mask = GrayImage::from_fn(37, 23, |x, y| {
            if (x / 3 + y / 2) % 3 == 0 {
                Luma([0])
            } else if (x + y) % 2 == 0 {
                Luma([128])
            } else {
                Luma([255])
            }
        });
        for target in [Dimensions::new(11, 7), Dimensions::new(100, 61)] {
            let resized = resize_nearest(&mask, target);
            assert_eq!(Dimensions::of(&resized), target);
            assert!(resized.pixels().all(|p| matches!(p[0], 0 | 128 | 255)));
        }
    }

    #[test]
    fn test_resize_bilinear_noop_on_same_size() {
        let img = test_image(10, 10);
        let result = resize_bilinear(&img, Dimensions::new(10, 10));
        assert_eq!(result, img);
    }
}

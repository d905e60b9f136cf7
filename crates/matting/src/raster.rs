//! Conversions between 8-bit rasters and the [0, 1] floating point rasters the
//! solvers work on.

use image::{GrayImage, Luma, Rgb, Rgb32FImage, RgbImage, Rgba, RgbaImage};

use crate::{
    error::{MattingError, Result},
    resize::Dimensions,
    types::GrayF32Image,
};

fn unit_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Divide every channel by 255.
pub fn rgb_to_unit(image: &RgbImage) -> Rgb32FImage {
    Rgb32FImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Rgb([f32::from(r) / 255.0, f32::from(g) / 255.0, f32::from(b) / 255.0])
    })
}

pub fn unit_to_rgb(image: &Rgb32FImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Rgb([unit_to_u8(r), unit_to_u8(g), unit_to_u8(b)])
    })
}

/// Clamp to [0, 1], scale by 255 and round.
pub fn alpha_to_luma(alpha: &GrayF32Image) -> GrayImage {
    GrayImage::from_fn(alpha.width(), alpha.height(), |x, y| Luma([unit_to_u8(alpha.get_pixel(x, y)[0])]))
}

pub fn clamp_unit(alpha: &mut GrayF32Image) {
    for pixel in alpha.pixels_mut() {
        // NaN collapses to transparent
        pixel[0] = if pixel[0].is_nan() { 0.0 } else { pixel[0].clamp(0.0, 1.0) };
    }
}

/// Stack a foreground color estimate and its alpha into one RGBA layer.
pub fn compose_rgba(foreground: &Rgb32FImage, alpha: &GrayF32Image) -> Result<RgbaImage> {
    let expected = Dimensions::of(alpha);
    let actual = Dimensions::of(foreground);
    if expected != actual {
        return Err(MattingError::ShapeMismatch {
            stage: "foreground layer",
            expected: expected.width_height(),
            actual: actual.width_height(),
        });
    }

    Ok(RgbaImage::from_fn(alpha.width(), alpha.height(), |x, y| {
        let Rgb([r, g, b]) = *foreground.get_pixel(x, y);
        let a = alpha.get_pixel(x, y)[0];
        Rgba([unit_to_u8(r), unit_to_u8(g), unit_to_u8(b), unit_to_u8(a)])
    }))
}

/// Error unless both rasters share the same dimensions.
pub fn ensure_same_size(stage: &'static str, expected: Dimensions, actual: Dimensions) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(MattingError::ShapeMismatch {
            stage,
            expected: expected.width_height(),
            actual: actual.width_height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_to_luma_clamps_overshoot() {
        let alpha = GrayF32Image::from_fn(4, 1, |x, _| Luma([[-0.2, 0.5, 1.0, 1.3][x as usize]]));
        let luma = alpha_to_luma(&alpha);
        let values: Vec<u8> = luma.pixels().map(|p| p[0]).collect();
        assert_eq!(values, [0, 128, 255, 255]);
    }

    #[test]
    fn test_clamp_unit_handles_nan() {
        let mut alpha = GrayF32Image::from_fn(3, 1, |x, _| Luma([[f32::NAN, -1.0, 2.0][x as usize]]));
        clamp_unit(&mut alpha);
        let values: Vec<f32> = alpha.pixels().map(|p| p[0]).collect();
        assert_eq!(values, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_compose_rgba_rejects_mismatched_layers() {
        let foreground = Rgb32FImage::new(4, 4);
        let alpha = GrayF32Image::new(4, 3);
        let err = compose_rgba(&foreground, &alpha).unwrap_err();
        assert!(matches!(err, MattingError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_compose_rgba_stacks_alpha_channel() {
        let foreground = Rgb32FImage::from_pixel(2, 2, Rgb([1.0, 0.0, 0.5]));
        let alpha = GrayF32Image::from_pixel(2, 2, Luma([0.25]));
        let rgba = compose_rgba(&foreground, &alpha).expect("Should compose");
        assert_eq!(*rgba.get_pixel(1, 1), Rgba([255, 0, 128, 64]));
    }

    #[test]
    fn test_rgb_unit_round_trip() {
        let image = RgbImage::from_fn(5, 3, |x, y| Rgb([(x * 50) as u8, (y * 80) as u8, 255]));
        assert_eq!(unit_to_rgb(&rgb_to_unit(&image)), image);
    }
}

//! Transport encoding: PNG bytes wrapped in standard base64.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};

use crate::error::{MattingError, Result};

/// Encode a raster as base64 PNG. `raster` names it in error reports.
pub fn encode_png(image: DynamicImage, raster: &'static str) -> Result<String> {
    let mut png_bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|source| MattingError::Encode { raster, source })?;
    Ok(general_purpose::STANDARD.encode(png_bytes))
}

pub fn encode_gray(image: &GrayImage, raster: &'static str) -> Result<String> {
    encode_png(DynamicImage::ImageLuma8(image.clone()), raster)
}

pub fn encode_rgb(image: &RgbImage, raster: &'static str) -> Result<String> {
    encode_png(DynamicImage::ImageRgb8(image.clone()), raster)
}

pub fn encode_rgba(image: &RgbaImage, raster: &'static str) -> Result<String> {
    encode_png(DynamicImage::ImageRgba8(image.clone()), raster)
}

/// Decode a base64 payload into raw bytes.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    Ok(general_purpose::STANDARD.decode(payload.trim())?)
}

/// Decode a base64 PNG (or any format `image` recognizes) back into an image.
pub fn decode_image(payload: &str) -> Result<DynamicImage> {
    let bytes = decode_base64(payload)?;
    Ok(image::load_from_memory(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    #[test]
    fn test_encoded_gray_keeps_single_channel() {
        let gray = GrayImage::from_fn(8, 4, |x, _| Luma([(x * 30) as u8]));
        let encoded = encode_gray(&gray, "alpha").expect("Should encode");
        assert!(encoded.is_ascii());

        let decoded = decode_image(&encoded).expect("Should decode");
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
        assert_eq!(decoded.to_luma8(), gray);
    }

    #[test]
    fn test_encoded_rgba_keeps_alpha_channel() {
        let rgba = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 40]));
        let decoded = decode_image(&encode_rgba(&rgba, "foreground").expect("Should encode")).expect("Should decode");
        assert!(matches!(decoded, DynamicImage::ImageRgba8(_)));
        assert_eq!(decoded.to_rgba8(), rgba);
    }

    #[test]
    fn test_invalid_payload_is_decode_error() {
        let err = decode_image("not base64 at all!").unwrap_err();
        assert!(matches!(err, MattingError::Decode(_)));
    }
}

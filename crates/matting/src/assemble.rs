//! Result assembly: quantize, restore to the original resolution, encode.

use std::time::Instant;

use image::{GrayImage, Rgb32FImage, RgbImage};
use tracing::{debug, instrument};

use crate::{
    encode::{encode_gray, encode_rgb, encode_rgba},
    error::Result,
    raster::{alpha_to_luma, clamp_unit, compose_rgba},
    resize::{resize_bilinear, resize_nearest, Dimensions},
    types::{round_seconds, Algorithm, GrayF32Image, MatteResult, MattingParams},
};

/// Working-resolution outputs of the earlier stages.
pub struct WorkingRasters {
    pub alpha: GrayF32Image,
    pub trimap: GrayImage,
    pub foreground: Option<Rgb32FImage>,
}

/// Build the result bundle.
///
/// `original` is the caller's image at its own resolution; the working
/// rasters are scaled back to it only when the sizes differ.
#[instrument(skip_all, fields(algorithm = %algorithm))]
pub fn assemble(
    original: &RgbImage,
    working: WorkingRasters,
    algorithm: Algorithm,
    parameters: MattingParams,
    started: Instant,
) -> Result<MatteResult> {
    let WorkingRasters { mut alpha, trimap, foreground } = working;
    let original_size = Dimensions::of(original);
    let working_size = Dimensions::of(&alpha);

    clamp_unit(&mut alpha);
    let alpha_matte = alpha_to_luma(&alpha);
    let foreground = foreground
        .map(|fg| compose_rgba(&fg, &alpha))
        .transpose()?;

    let (alpha_matte, trimap, foreground) = if working_size != original_size {
        debug!(
            "Restoring {}x{} -> {}x{}",
            working_size.width, working_size.height, original_size.width, original_size.height
        );
        (
            resize_bilinear(&alpha_matte, original_size),
            resize_nearest(&trimap, original_size),
            foreground.map(|fg| resize_bilinear(&fg, original_size)),
        )
    } else {
        (alpha_matte, trimap, foreground)
    };

    let alpha_matte = encode_gray(&alpha_matte, "alpha matte")?;
    let trimap = encode_gray(&trimap, "trimap")?;
    let original_image = encode_rgb(original, "original image")?;
    let foreground = foreground
        .map(|fg| encode_rgba(&fg, "foreground"))
        .transpose()?;

    Ok(MatteResult {
        alpha_matte,
        trimap,
        original_image,
        foreground,
        processing_time: round_seconds(started.elapsed().as_secs_f64()),
        image_size: original_size.height_width(),
        algorithm,
        parameters,
    })
}

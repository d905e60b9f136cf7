use image::{Luma, Rgb, Rgb32FImage};
use matting::GrayF32Image;

pub const LEFT: [f32; 3] = [0.8, 0.2, 0.2];
pub const RIGHT: [f32; 3] = [0.1, 0.3, 0.9];

/// Left half one color, right half another.
pub fn two_tone(width: u32, height: u32) -> Rgb32FImage {
    Rgb32FImage::from_fn(width, height, |x, _| Rgb(if x < width / 2 { LEFT } else { RIGHT }))
}

/// Background left of `bg_end`, foreground from `fg_start`, unknown between.
pub fn column_trimap(width: u32, height: u32, bg_end: u32, fg_start: u32) -> GrayF32Image {
    GrayF32Image::from_fn(width, height, |x, _| {
        Luma([if x < bg_end {
            0.0
        } else if x >= fg_start {
            1.0
        } else {
            0.5
        }])
    })
}

/// Alpha follows the color edge and the known regions are exact.
pub fn assert_two_tone_alpha(alpha: &GrayF32Image, bg_end: u32, fg_start: u32) {
    let (width, height) = alpha.dimensions();
    for (x, y, pixel) in alpha.enumerate_pixels() {
        let a = pixel[0];
        if x < bg_end {
            assert_eq!(a, 0.0, "Known background changed at ({x}, {y})");
        } else if x >= fg_start {
            assert_eq!(a, 1.0, "Known foreground changed at ({x}, {y})");
        } else if x < width / 2 {
            assert!(a < 0.1, "Expected background at ({x}, {y}), got {a}");
        } else {
            assert!(a > 0.9, "Expected foreground at ({x}, {y}), got {a}");
        }
        assert!(y < height);
    }
}

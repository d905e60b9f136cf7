//! Trimap construction from a binary selection mask.
//!
//! The mask is eroded to find certain foreground and dilated to bound the
//! region that may still contain foreground. Everything between the two is
//! the unknown band the alpha solvers resolve.

use image::{GrayImage, Luma};
use tracing::debug;

use crate::{resize::Dimensions, types::GrayF32Image};

/// Intensity above which a mask pixel counts as selected.
pub const MASK_THRESHOLD: u8 = 127;

/// Disk-shaped structuring element stored as horizontal runs relative to
/// the anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    diameter: u32,
    /// `(dy, dx_start, dx_end)`, inclusive on both ends
    runs: Vec<(i32, i32, i32)>,
}

impl StructuringElement {
    /// Elliptic element inscribed in a `diameter x diameter` box, anchored at
    /// `(diameter / 2, diameter / 2)`. Diameters 0 and 1 give the identity.
    pub fn disk(diameter: u32) -> Self {
        if diameter <= 1 {
            return Self {
                diameter,
                runs: vec![(0, 0, 0)],
            };
        }

        let size = diameter as i32;
        let r = size / 2;
        let c = size / 2;
        let inv_r2 = 1.0 / f64::from(r * r);

        let mut runs = Vec::with_capacity(diameter as usize);
        for i in 0..size {
            let dy = i - r;
            if dy.abs() > r {
                continue;
            }
            let dx = (f64::from(c) * (f64::from(r * r - dy * dy) * inv_r2).sqrt()).round() as i32;
            let j1 = (c - dx).max(0);
            let j2 = (c + dx + 1).min(size);
            if j2 > j1 {
                runs.push((dy, j1 - c, j2 - 1 - c));
            }
        }

        Self { diameter, runs }
    }

    pub fn diameter(&self) -> u32 {
        self.diameter
    }

    pub fn is_identity(&self) -> bool {
        self.runs == [(0, 0, 0)]
    }

    /// Whether the element covers the offset `(dx, dy)` from its anchor
    pub fn contains(&self, dx: i32, dy: i32) -> bool {
        self.runs
            .iter()
            .any(|&(row, start, end)| row == dy && (start..=end).contains(&dx))
    }
}

/// Per-row prefix counts of selected pixels, so a run can be tested in O(1).
struct RowCounts {
    width: i32,
    height: i32,
    counts: Vec<u32>,
}

impl RowCounts {
    fn new(binary: &GrayImage) -> Self {
        let (width, height) = binary.dimensions();
        let stride = width as usize + 1;
        let mut counts = vec![0u32; stride * height as usize];
        for (y, row) in binary.rows().enumerate() {
            let base = y * stride;
            for (x, pixel) in row.enumerate() {
                counts[base + x + 1] = counts[base + x] + u32::from(pixel[0] > MASK_THRESHOLD);
            }
        }
        Self {
            width: width as i32,
            height: height as i32,
            counts,
        }
    }

    /// Selected pixels and total pixels of row `y` within `[x0, x1]`,
    /// clipped to the image. `None` if the row or span lies outside.
    fn span(&self, y: i32, x0: i32, x1: i32) -> Option<(u32, u32)> {
        if y < 0 || y >= self.height {
            return None;
        }
        let x0 = x0.max(0);
        let x1 = x1.min(self.width - 1);
        if x0 > x1 {
            return None;
        }
        let base = y as usize * (self.width as usize + 1);
        let selected = self.counts[base + x1 as usize + 1] - self.counts[base + x0 as usize];
        Some((selected, (x1 - x0 + 1) as u32))
    }
}

/// Binary erosion. Pixels outside the image never erode.
pub fn erode(binary: &GrayImage, element: &StructuringElement) -> GrayImage {
    if element.is_identity() {
        return binarize(binary);
    }
    let rows = RowCounts::new(binary);
    GrayImage::from_fn(binary.width(), binary.height(), |x, y| {
        let (x, y) = (x as i32, y as i32);
        let keep = element.runs.iter().all(|&(dy, start, end)| {
            match rows.span(y + dy, x + start, x + end) {
                Some((selected, total)) => selected == total,
                None => true,
            }
        });
        Luma([if keep { 255 } else { 0 }])
    })
}

/// Binary dilation. Pixels outside the image never dilate.
pub fn dilate(binary: &GrayImage, element: &StructuringElement) -> GrayImage {
    if element.is_identity() {
        return binarize(binary);
    }
    let rows = RowCounts::new(binary);
    GrayImage::from_fn(binary.width(), binary.height(), |x, y| {
        let (x, y) = (x as i32, y as i32);
        let grow = element.runs.iter().any(|&(dy, start, end)| {
            matches!(rows.span(y + dy, x + start, x + end), Some((selected, _)) if selected > 0)
        });
        Luma([if grow { 255 } else { 0 }])
    })
}

/// Threshold a mask to {0, 255} (`> 127` is selected).
pub fn binarize(mask: &GrayImage) -> GrayImage {
    imageproc::contrast::threshold(mask, MASK_THRESHOLD)
}

/// Pixel counts per trimap class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimapCounts {
    pub background: u64,
    pub unknown: u64,
    pub foreground: u64,
}

/// Three-class map: 0 certain background, 128 unknown, 255 certain foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimap(GrayImage);

impl Trimap {
    pub const BACKGROUND: u8 = 0;
    pub const UNKNOWN: u8 = 128;
    pub const FOREGROUND: u8 = 255;

    /// Build a trimap from a selection mask, see [`build_trimap`].
    pub fn from_mask(mask: &GrayImage, erosion_kernel_size: u32, dilation_kernel_size: u32) -> Self {
        build_trimap(mask, erosion_kernel_size, dilation_kernel_size)
    }

    /// Snap an arbitrary grayscale image onto the three classes:
    /// below 85 is background, above 170 foreground, the rest unknown.
    pub fn from_gray(image: &GrayImage) -> Self {
        let snapped = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            Luma([match image.get_pixel(x, y)[0] {
                v if v < 85 => Self::BACKGROUND,
                v if v > 170 => Self::FOREGROUND,
                _ => Self::UNKNOWN,
            }])
        });
        Self(snapped)
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_image(self) -> GrayImage {
        self.0
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.0)
    }

    pub fn counts(&self) -> TrimapCounts {
        self.0.pixels().fold(TrimapCounts::default(), |mut counts, pixel| {
            match pixel[0] {
                Self::BACKGROUND => counts.background += 1,
                Self::FOREGROUND => counts.foreground += 1,
                _ => counts.unknown += 1,
            }
            counts
        })
    }

    pub fn has_unknown(&self) -> bool {
        self.0.pixels().any(|p| p[0] == Self::UNKNOWN)
    }

    /// Scale to [0, 1] by dividing by 255, without re-quantizing.
    pub fn to_normalized(&self) -> GrayF32Image {
        GrayF32Image::from_fn(self.0.width(), self.0.height(), |x, y| {
            Luma([f32::from(self.0.get_pixel(x, y)[0]) / 255.0])
        })
    }

    /// Alpha implied by the certain regions alone (unknown pixels at 0.5).
    pub fn to_alpha(&self) -> GrayF32Image {
        GrayF32Image::from_fn(self.0.width(), self.0.height(), |x, y| {
            Luma([match self.0.get_pixel(x, y)[0] {
                Self::BACKGROUND => 0.0,
                Self::FOREGROUND => 1.0,
                _ => 0.5,
            }])
        })
    }
}

/// Convert a selection mask into a trimap.
///
/// 1. Binarize the mask (`> 127`).
/// 2. Erode with a disk of `erosion_kernel_size` diameter: certain foreground.
/// 3. Dilate with a disk of `dilation_kernel_size` diameter: outside is
///    certain background.
/// 4. Everything else is unknown.
///
/// Kernel sizes of 0 leave the mask untouched, which can shrink or remove the
/// unknown band.
pub fn build_trimap(mask: &GrayImage, erosion_kernel_size: u32, dilation_kernel_size: u32) -> Trimap {
    let binary = binarize(mask);

    let eroded = erode(&binary, &StructuringElement::disk(erosion_kernel_size));
    let dilated = dilate(&binary, &StructuringElement::disk(dilation_kernel_size));

    let trimap = GrayImage::from_fn(binary.width(), binary.height(), |x, y| {
        let class = if dilated.get_pixel(x, y)[0] == 0 {
            Trimap::BACKGROUND
        } else if eroded.get_pixel(x, y)[0] == 255 {
            Trimap::FOREGROUND
        } else {
            Trimap::UNKNOWN
        };
        Luma([class])
    });

    let trimap = Trimap(trimap);
    let counts = trimap.counts();
    debug!(
        erosion_kernel_size,
        dilation_kernel_size,
        background = counts.background,
        unknown = counts.unknown,
        foreground = counts.foreground,
        "Built trimap"
    );
    trimap
}

//! Flat views of the image and trimap shared by every solver.

use image::{Luma, Rgb32FImage};
use matting::GrayF32Image;

use crate::error::{Result, SolverError};

/// Trimap values at or above this are certain foreground.
pub const FG_THRESHOLD: f32 = 0.9;
/// Trimap values at or below this are certain background.
pub const BG_THRESHOLD: f32 = 0.1;

const NOT_UNKNOWN: usize = usize::MAX;

/// Row-major RGB pixels in f64.
pub struct ColorGrid {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f64; 3]>,
}

impl ColorGrid {
    pub fn new(image: &Rgb32FImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            pixels: image
                .pixels()
                .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Partition of the trimap into known pixels (boundary conditions) and
/// unknown pixels (the unknowns of the linear system).
pub struct TrimapSplit {
    pub width: usize,
    pub height: usize,
    /// Pixel ids of unknown pixels, row-major
    pub unknown: Vec<usize>,
    /// Pixel id to position in `unknown`
    unknown_index: Vec<usize>,
    /// Alpha of known pixels, 0 at unknown pixels
    pub known_alpha: Vec<f64>,
}

impl TrimapSplit {
    pub fn new(trimap: &GrayF32Image) -> Self {
        let mut unknown = Vec::new();
        let mut unknown_index = vec![NOT_UNKNOWN; trimap.len()];
        let mut known_alpha = vec![0.0; trimap.len()];

        for (id, pixel) in trimap.pixels().enumerate() {
            let t = pixel[0];
            if t >= FG_THRESHOLD {
                known_alpha[id] = 1.0;
            } else if t > BG_THRESHOLD {
                unknown_index[id] = unknown.len();
                unknown.push(id);
            }
        }

        Self {
            width: trimap.width() as usize,
            height: trimap.height() as usize,
            unknown,
            unknown_index,
            known_alpha,
        }
    }

    pub fn len(&self) -> usize {
        self.unknown_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unknown_index.is_empty()
    }

    pub fn unknown_count(&self) -> usize {
        self.unknown.len()
    }

    pub fn is_unknown(&self, id: usize) -> bool {
        self.unknown_index[id] != NOT_UNKNOWN
    }

    /// Position of pixel `id` among the unknowns
    pub fn unknown_position(&self, id: usize) -> Option<usize> {
        match self.unknown_index[id] {
            NOT_UNKNOWN => None,
            pos => Some(pos),
        }
    }

    /// Full alpha from the solution for the unknown pixels, clipped to [0, 1].
    pub fn compose(&self, solution: &[f64]) -> GrayF32Image {
        let mut alpha = self.known_alpha.clone();
        for (&id, &value) in self.unknown.iter().zip(solution) {
            alpha[id] = value;
        }
        GrayF32Image::from_fn(self.width as u32, self.height as u32, |x, y| {
            let v = alpha[y as usize * self.width + x as usize];
            Luma([v.clamp(0.0, 1.0) as f32])
        })
    }
}

pub fn check_shapes(image: &Rgb32FImage, trimap: &GrayF32Image) -> Result<()> {
    if image.dimensions() != trimap.dimensions() {
        return Err(SolverError::ShapeMismatch {
            image: image.dimensions(),
            trimap: trimap.dimensions(),
        });
    }
    Ok(())
}

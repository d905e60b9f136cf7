//! Blur-Fusion foreground estimation (Germer et al., "Approximate Fast
//! Foreground Colour Estimation").
//!
//! Each pass smooths the current foreground weighted by alpha and the
//! background weighted by `1 - alpha`, then corrects the smoothed foreground
//! with the compositing residual:
//!
//! ```text
//! F = F̂ + α (I - α F̂ - (1 - α) B̂)
//! ```

use image::{Rgb, Rgb32FImage};
use matting::{BoxError, ForegroundSolver, GrayF32Image};
use tracing::debug;

use crate::{
    boxfilter::box_mean_clipped,
    error::{Result, SolverError},
};

const MIN_WEIGHT: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct BlurFusion {
    /// Box radius of each pass, applied in order
    pub radii: Vec<usize>,
}

impl Default for BlurFusion {
    /// Two passes, coarse then fine.
    fn default() -> Self {
        Self { radii: vec![91, 7] }
    }
}

fn weighted_mean(values: &[f64], weights: &[f64], fallback: &[f64], width: usize, height: usize, r: usize) -> Vec<f64> {
    let weighted: Vec<f64> = values.iter().zip(weights).map(|(v, w)| v * w).collect();
    let numerator = box_mean_clipped(&weighted, width, height, r);
    let denominator = box_mean_clipped(weights, width, height, r);
    numerator
        .iter()
        .zip(&denominator)
        .zip(fallback)
        .map(|((n, d), f)| if *d > MIN_WEIGHT { n / d } else { *f })
        .collect()
}

impl BlurFusion {
    pub fn estimate(&self, image: &Rgb32FImage, alpha: &GrayF32Image) -> Result<Rgb32FImage> {
        if image.dimensions() != alpha.dimensions() {
            return Err(SolverError::ShapeMismatch {
                image: image.dimensions(),
                trimap: alpha.dimensions(),
            });
        }
        if self.radii.is_empty() {
            return Err(SolverError::InvalidParameter("at least one blur radius is required".to_string()));
        }

        let (width, height) = (image.width() as usize, image.height() as usize);
        let a: Vec<f64> = alpha.pixels().map(|p| f64::from(p[0]).clamp(0.0, 1.0)).collect();
        let beta: Vec<f64> = a.iter().map(|v| 1.0 - v).collect();
        let observed: [Vec<f64>; 3] = [0, 1, 2].map(|c| image.pixels().map(|p| f64::from(p[c])).collect());

        let mut foreground = observed.clone();
        for &r in &self.radii {
            for c in 0..3 {
                let f_hat = weighted_mean(&foreground[c], &a, &foreground[c], width, height, r);
                let b_hat = weighted_mean(&observed[c], &beta, &observed[c], width, height, r);
                foreground[c] = (0..a.len())
                    .map(|i| {
                        let residual = observed[c][i] - a[i] * f_hat[i] - beta[i] * b_hat[i];
                        (f_hat[i] + a[i] * residual).clamp(0.0, 1.0)
                    })
                    .collect();
            }
            debug!(radius = r, "Blur-Fusion pass done");
        }

        Ok(Rgb32FImage::from_fn(image.width(), image.height(), |x, y| {
            let i = y as usize * width + x as usize;
            Rgb([foreground[0][i] as f32, foreground[1][i] as f32, foreground[2][i] as f32])
        }))
    }
}

impl ForegroundSolver for BlurFusion {
    fn solve(&self, image: &Rgb32FImage, alpha: &GrayF32Image) -> std::result::Result<Rgb32FImage, BoxError> {
        Ok(self.estimate(image, alpha)?)
    }
}

//! Closed-form matting (Levin et al.) over 3x3 windows.

use image::Rgb32FImage;
use matting::{AlphaSolver, BoxError, GrayF32Image};

use crate::{
    cg::CgConfig,
    error::Result,
    grid::{check_shapes, ColorGrid, TrimapSplit},
    laplacian::{assemble_windows, solve_reduced, RowMatrix, WindowColors, WindowLaplacian, WINDOW_PIXELS},
    linalg::{self, Matrix},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedFormSolver {
    /// Regularization of the per-window color covariance
    pub epsilon: f64,
    pub cg: CgConfig,
}

impl Default for ClosedFormSolver {
    fn default() -> Self {
        Self {
            epsilon: 1e-7,
            cg: CgConfig::default(),
        }
    }
}

/// Local matting Laplacian of one window:
/// `δ_ij - (1 + (I_i - μ)ᵀ (Σ + ε/n U)⁻¹ (I_j - μ)) / n`.
pub fn window_laplacian(colors: &WindowColors, epsilon: f64) -> Option<WindowLaplacian> {
    let n = WINDOW_PIXELS as f64;
    let mut mean = [0.0; 3];
    for color in colors {
        for c in 0..3 {
            mean[c] += color[c] / n;
        }
    }

    let centered: [[f64; 3]; WINDOW_PIXELS] = colors.map(|color| [color[0] - mean[0], color[1] - mean[1], color[2] - mean[2]]);
    let mut cov: Matrix<3> = [[0.0; 3]; 3];
    for d in &centered {
        for r in 0..3 {
            for c in 0..3 {
                cov[r][c] += d[r] * d[c] / n;
            }
        }
    }
    for (i, row) in cov.iter_mut().enumerate() {
        row[i] += epsilon / n;
    }
    let inv = linalg::invert(&cov)?;

    let projected: [[f64; 3]; WINDOW_PIXELS] = centered.map(|d| linalg::mat_vec(&inv, &d));
    let mut lw = [[0.0; WINDOW_PIXELS]; WINDOW_PIXELS];
    for i in 0..WINDOW_PIXELS {
        for j in 0..WINDOW_PIXELS {
            let delta = if i == j { 1.0 } else { 0.0 };
            lw[i][j] = delta - (1.0 + linalg::dot(&projected[i], &centered[j])) / n;
        }
    }
    Some(lw)
}

impl ClosedFormSolver {
    pub fn laplacian(&self, grid: &ColorGrid, split: &TrimapSplit) -> Result<RowMatrix> {
        assemble_windows(grid, split, |colors| window_laplacian(colors, self.epsilon))
    }

    pub fn solve_alpha(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> Result<GrayF32Image> {
        check_shapes(image, trimap)?;
        let split = TrimapSplit::new(trimap);
        if split.unknown_count() == 0 {
            return Ok(split.compose(&[]));
        }
        let laplacian = self.laplacian(&ColorGrid::new(image), &split)?;
        solve_reduced(&laplacian, &split, &self.cg)
    }
}

impl AlphaSolver for ClosedFormSolver {
    fn solve(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> std::result::Result<GrayF32Image, BoxError> {
        Ok(self.solve_alpha(image, trimap)?)
    }
}

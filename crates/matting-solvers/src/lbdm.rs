//! Learning-based digital matting (Zheng and Kambhamettu) with a linear
//! kernel over 3x3 windows.

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
pub struct LbdmSolver {
    /// Ridge regularization of the local linear model
    pub epsilon: f64,
    pub cg: CgConfig,
}

impl Default for LbdmSolver {
    fn default() -> Self {
        Self {
            epsilon: 1e-7,
            cg: CgConfig::default(),
        }
    }
}

/// `(I - F)ᵀ (I - F)` where `F = X (XᵀX + εU)⁻¹ Xᵀ` is the ridge regression
/// hat matrix of the window's `[r, g, b, 1]` features.
pub fn window_laplacian(colors: &WindowColors, epsilon: f64) -> Option<WindowLaplacian> {
    let features: [[f64; 4]; WINDOW_PIXELS] = colors.map(|c| [c[0], c[1], c[2], 1.0]);

    let mut gram: Matrix<4> = [[0.0; 4]; 4];
    for x in &features {
        for r in 0..4 {
            for c in 0..4 {
                gram[r][c] += x[r] * x[c];
            }
        }
    }
    for (i, row) in gram.iter_mut().enumerate() {
        row[i] += epsilon;
    }
    let inv = linalg::invert(&gram)?;

    let projected: [[f64; 4]; WINDOW_PIXELS] = features.map(|x| linalg::mat_vec(&inv, &x));
    let mut residual = [[0.0; WINDOW_PIXELS]; WINDOW_PIXELS];
    for i in 0..WINDOW_PIXELS {
        for j in 0..WINDOW_PIXELS {
            let delta = if i == j { 1.0 } else { 0.0 };
            residual[i][j] = delta - linalg::dot(&projected[i], &features[j]);
        }
    }

    let mut lw = [[0.0; WINDOW_PIXELS]; WINDOW_PIXELS];
    for i in 0..WINDOW_PIXELS {
        for j in 0..WINDOW_PIXELS {
            lw[i][j] = (0..WINDOW_PIXELS).map(|k| residual[k][i] * residual[k][j]).sum();
        }
    }
    Some(lw)
}

impl LbdmSolver {
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

impl AlphaSolver for LbdmSolver {
    fn solve(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> std::result::Result<GrayF32Image, BoxError> {
        Ok(self.solve_alpha(image, trimap)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{assert_two_tone_alpha, column_trimap, two_tone};

    #[test]
    fn test_window_is_symmetric_and_annihilates_constants() {
        let mut colors = [[0.2, 0.4, 0.6]; WINDOW_PIXELS];
        colors[4] = [0.9, 0.1, 0.5];
        let lw = window_laplacian(&colors, 1e-7).expect("Should build window");
        for i in 0..WINDOW_PIXELS {
            assert!(lw[i].iter().sum::<f64>().abs() < 1e-5);
            for j in 0..WINDOW_PIXELS {
                assert!((lw[i][j] - lw[j][i]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_two_tone_edge() {
        let image = two_tone(12, 10);
        let trimap = column_trimap(12, 10, 3, 9);
        let alpha = LbdmSolver::default().solve_alpha(&image, &trimap).expect("Should solve");
        assert_two_tone_alpha(&alpha, 3, 9);
    }
}

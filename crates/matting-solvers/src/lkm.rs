//! Large kernel matting (He et al.): the closed-form Laplacian over large
//! windows, applied matrix-free through box sums.
//!
//! For window `k` with `n` pixels, `(L_k p)_i = p_i - a_kᵀ I_i - b_k` where
//! `a_k = Δ_k⁻¹ (mean(I p) - μ_k p̄_k)`, `b_k = p̄_k - a_kᵀ μ_k` and
//! `Δ_k = Σ_k + ε/n U`. Summing over the windows covering pixel `i` needs
//! only box sums of per-pixel and per-window quantities.

use image::Rgb32FImage;
use matting::{AlphaSolver, BoxError, GrayF32Image};
use tracing::debug;

use crate::{
    boxfilter::{box_full, box_valid},
    cg::CgConfig,
    error::{Result, SolverError},
    grid::{check_shapes, ColorGrid, TrimapSplit},
    laplacian::{solve_reduced, LaplacianOperator},
    linalg::{self, Matrix},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LkmSolver {
    /// Window radius; shrunk when the image is too small for it
    pub radius: usize,
    pub epsilon: f64,
    pub cg: CgConfig,
}

impl Default for LkmSolver {
    fn default() -> Self {
        Self {
            radius: 10,
            epsilon: 1e-7,
            cg: CgConfig::default(),
        }
    }
}

pub struct LkmOperator<'a> {
    grid: &'a ColorGrid,
    split: &'a TrimapSplit,
    radius: usize,
    window_len: f64,
    means: Vec<[f64; 3]>,
    inv_delta: Vec<Matrix<3>>,
    /// Number of windows covering each pixel
    coverage: Vec<f64>,
}

impl<'a> LkmOperator<'a> {
    pub fn new(grid: &'a ColorGrid, split: &'a TrimapSplit, radius: usize, epsilon: f64) -> Result<Self> {
        let (width, height) = (grid.width, grid.height);
        if width == 0 || height == 0 {
            return Err(SolverError::InvalidParameter("image is empty".to_string()));
        }
        let radius = radius.min((width - 1) / 2).min((height - 1) / 2);
        let side = 2 * radius + 1;
        let n = (side * side) as f64;
        let windows_w = width - 2 * radius;

        let channel = |c: usize| -> Vec<f64> { grid.pixels.iter().map(|p| p[c]).collect() };
        let sums: [Vec<f64>; 3] = [0, 1, 2].map(|c| box_valid(&channel(c), width, height, radius));
        let mut second: [[Vec<f64>; 3]; 3] = Default::default();
        for r in 0..3 {
            for c in r..3 {
                let products: Vec<f64> = grid.pixels.iter().map(|p| p[r] * p[c]).collect();
                second[r][c] = box_valid(&products, width, height, radius);
            }
        }

        let windows = sums[0].len();
        let mut means = Vec::with_capacity(windows);
        let mut inv_delta = Vec::with_capacity(windows);
        for k in 0..windows {
            let mean = [sums[0][k] / n, sums[1][k] / n, sums[2][k] / n];
            let mut delta: Matrix<3> = [[0.0; 3]; 3];
            for r in 0..3 {
                for c in r..3 {
                    let cov = second[r][c][k] / n - mean[r] * mean[c];
                    delta[r][c] = cov;
                    delta[c][r] = cov;
                }
                delta[r][r] += epsilon / n;
            }
            let inv = linalg::invert(&delta).ok_or(SolverError::Singular {
                x: (k % windows_w + radius) as u32,
                y: (k / windows_w + radius) as u32,
            })?;
            means.push(mean);
            inv_delta.push(inv);
        }

        let coverage = box_full(&vec![1.0; windows], width, height, radius);
        debug!(radius, windows, "Prepared large kernel windows");

        Ok(Self {
            grid,
            split,
            radius,
            window_len: n,
            means,
            inv_delta,
            coverage,
        })
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    fn full(&self, window_values: &[f64]) -> Vec<f64> {
        box_full(window_values, self.grid.width, self.grid.height, self.radius)
    }
}

impl LaplacianOperator for LkmOperator<'_> {
    fn apply_unknown_rows(&self, x: &[f64], out: &mut [f64]) {
        let (width, height, n) = (self.grid.width, self.grid.height, self.window_len);
        let p_sum = box_valid(x, width, height, self.radius);
        let ip_sums: [Vec<f64>; 3] = [0, 1, 2].map(|c| {
            let weighted: Vec<f64> = self.grid.pixels.iter().zip(x).map(|(p, v)| p[c] * v).collect();
            box_valid(&weighted, width, height, self.radius)
        });

        let windows = p_sum.len();
        let mut a = [vec![0.0; windows], vec![0.0; windows], vec![0.0; windows]];
        let mut b = vec![0.0; windows];
        for k in 0..windows {
            let p_mean = p_sum[k] / n;
            let mu = self.means[k];
            let rhs = [
                ip_sums[0][k] / n - mu[0] * p_mean,
                ip_sums[1][k] / n - mu[1] * p_mean,
                ip_sums[2][k] / n - mu[2] * p_mean,
            ];
            let ak = linalg::mat_vec(&self.inv_delta[k], &rhs);
            for c in 0..3 {
                a[c][k] = ak[c];
            }
            b[k] = p_mean - linalg::dot(&ak, &mu);
        }

        let a_full = [self.full(&a[0]), self.full(&a[1]), self.full(&a[2])];
        let b_full = self.full(&b);
        for (slot, &id) in out.iter_mut().zip(&self.split.unknown) {
            let color = self.grid.pixels[id];
            let affine: f64 = (0..3).map(|c| a_full[c][id] * color[c]).sum();
            *slot = self.coverage[id] * x[id] - affine - b_full[id];
        }
    }

    fn unknown_diagonal(&self) -> Vec<f64> {
        let windows = self.means.len();
        let n = self.window_len;

        let mut v_entries: Vec<Vec<f64>> = vec![vec![0.0; windows]; 9];
        let mut v_mu: Vec<Vec<f64>> = vec![vec![0.0; windows]; 3];
        let mut mu_v_mu = vec![0.0; windows];
        for k in 0..windows {
            let v = &self.inv_delta[k];
            for r in 0..3 {
                for c in 0..3 {
                    v_entries[r * 3 + c][k] = v[r][c];
                }
            }
            let vm = linalg::mat_vec(v, &self.means[k]);
            for c in 0..3 {
                v_mu[c][k] = vm[c];
            }
            mu_v_mu[k] = linalg::dot(&self.means[k], &vm);
        }

        let s_v: Vec<Vec<f64>> = v_entries.iter().map(|e| self.full(e)).collect();
        let s_vm: Vec<Vec<f64>> = v_mu.iter().map(|e| self.full(e)).collect();
        let s_mvm = self.full(&mu_v_mu);

        self.split
            .unknown
            .iter()
            .map(|&id| {
                let color = self.grid.pixels[id];
                let mut quadratic = 0.0;
                for r in 0..3 {
                    for c in 0..3 {
                        quadratic += color[r] * s_v[r * 3 + c][id] * color[c];
                    }
                }
                let linear: f64 = (0..3).map(|c| color[c] * s_vm[c][id]).sum();
                self.coverage[id] * (1.0 - 1.0 / n) - (quadratic - 2.0 * linear + s_mvm[id]) / n
            })
            .collect()
    }
}

impl LkmSolver {
    pub fn solve_alpha(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> Result<GrayF32Image> {
        check_shapes(image, trimap)?;
        let split = TrimapSplit::new(trimap);
        if split.unknown_count() == 0 {
            return Ok(split.compose(&[]));
        }
        let grid = ColorGrid::new(image);
        let operator = LkmOperator::new(&grid, &split, self.radius, self.epsilon)?;
        solve_reduced(&operator, &split, &self.cg)
    }
}

impl AlphaSolver for LkmSolver {
    fn solve(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> std::result::Result<GrayF32Image, BoxError> {
        Ok(self.solve_alpha(image, trimap)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closed_form::ClosedFormSolver;
    use crate::laplacian::LaplacianOperator;
    use crate::test_support::{assert_two_tone_alpha, column_trimap, two_tone};
    use image::{Luma, Rgb};

    fn textured(width: u32, height: u32) -> Rgb32FImage {
        Rgb32FImage::from_fn(width, height, |x, y| {
            let t = (x * 7 + y * 13) as f32;
            Rgb([(t * 0.37).sin() * 0.5 + 0.5, (t * 0.11).cos() * 0.5 + 0.5, ((x + y) % 5) as f32 / 4.0])
        })
    }

    #[test]
    fn test_diagonal_matches_operator() {
        let image = textured(9, 8);
        let trimap = GrayF32Image::from_pixel(9, 8, Luma([0.5]));
        let split = TrimapSplit::new(&trimap);
        let grid = ColorGrid::new(&image);
        let operator = LkmOperator::new(&grid, &split, 2, 1e-3).expect("Should prepare windows");

        let diagonal = operator.unknown_diagonal();
        let mut out = vec![0.0; split.unknown_count()];
        for (u, &id) in split.unknown.iter().enumerate() {
            let mut e = vec![0.0; split.len()];
            e[id] = 1.0;
            operator.apply_unknown_rows(&e, &mut out);
            assert!((out[u] - diagonal[u]).abs() < 1e-6, "Pixel {id}: {} vs {}", out[u], diagonal[u]);
        }
    }

    #[test]
    fn test_radius_one_matches_closed_form() {
        let image = textured(7, 6);
        let trimap = GrayF32Image::from_pixel(7, 6, Luma([0.5]));
        let split = TrimapSplit::new(&trimap);
        let grid = ColorGrid::new(&image);

        let operator = LkmOperator::new(&grid, &split, 1, 1e-3).expect("Should prepare windows");
        let explicit = ClosedFormSolver { epsilon: 1e-3, ..ClosedFormSolver::default() }
            .laplacian(&grid, &split)
            .expect("Should build Laplacian");

        let x: Vec<f64> = (0..split.len()).map(|i| ((i * 5) % 11) as f64 / 10.0).collect();
        let mut implicit_out = vec![0.0; split.unknown_count()];
        let mut explicit_out = vec![0.0; split.unknown_count()];
        operator.apply_unknown_rows(&x, &mut implicit_out);
        explicit.apply_unknown_rows(&x, &mut explicit_out);
        for (a, b) in implicit_out.iter().zip(&explicit_out) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_radius_shrinks_to_fit() {
        let image = two_tone(12, 10);
        let trimap = column_trimap(12, 10, 3, 9);
        let split = TrimapSplit::new(&trimap);
        let grid = ColorGrid::new(&image);
        let operator = LkmOperator::new(&grid, &split, 10, 1e-7).expect("Should prepare windows");
        assert_eq!(operator.radius(), 4);
    }

    #[test]
    fn test_two_tone_edge() {
        let image = two_tone(12, 10);
        let trimap = column_trimap(12, 10, 3, 9);
        let alpha = LkmSolver::default().solve_alpha(&image, &trimap).expect("Should solve");
        assert_two_tone_alpha(&alpha, 3, 9);
    }

    #[test]
    fn test_flat_image_keeps_known_pixels() {
        let image = Rgb32FImage::from_pixel(10, 10, Rgb([0.4, 0.4, 0.4]));
        let trimap = column_trimap(10, 10, 2, 8);
        let alpha = LkmSolver::default().solve_alpha(&image, &trimap).expect("Should solve");
        assert_eq!(alpha.get_pixel(0, 0)[0], 0.0);
        assert_eq!(alpha.get_pixel(9, 9)[0], 1.0);
    }
}

//! Matting Laplacians restricted to the unknown rows and the reduced solve
//! shared by every Laplacian based solver.
//!
//! With known alpha `x_K` held fixed, minimizing `xᵀ L x` over the unknowns
//! gives `L_UU x_U = -L_UK x_K`. Operators only have to produce the unknown
//! rows of `L` applied to a full-length vector and the diagonal of `L_UU`.

use matting::GrayF32Image;
use tracing::debug;

use crate::{
    cg::{self, CgConfig},
    error::{Result, SolverError},
    grid::{ColorGrid, TrimapSplit},
};

pub trait LaplacianOperator {
    /// `out[u] = (L x)[split.unknown[u]]` for a full-length `x`.
    fn apply_unknown_rows(&self, x: &[f64], out: &mut [f64]);

    fn unknown_diagonal(&self) -> Vec<f64>;
}

/// Compressed sparse rows of `L`, one row per unknown pixel. Columns are
/// pixel ids.
#[derive(Debug, Clone, Default)]
pub struct RowMatrix {
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
    diagonal: Vec<f64>,
}

impl RowMatrix {
    pub fn rows(&self) -> usize {
        self.diagonal.len()
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        self.columns[range.clone()].iter().copied().zip(self.values[range].iter().copied())
    }
}

impl LaplacianOperator for RowMatrix {
    fn apply_unknown_rows(&self, x: &[f64], out: &mut [f64]) {
        for (row, slot) in out.iter_mut().enumerate() {
            *slot = self.row(row).map(|(col, v)| v * x[col]).sum();
        }
    }

    fn unknown_diagonal(&self) -> Vec<f64> {
        self.diagonal.clone()
    }
}

/// Collects `(unknown row, pixel column, value)` contributions and merges
/// duplicates on build.
pub struct RowMatrixBuilder<'a> {
    split: &'a TrimapSplit,
    rows: Vec<Vec<(usize, f64)>>,
}

impl<'a> RowMatrixBuilder<'a> {
    pub fn new(split: &'a TrimapSplit) -> Self {
        Self {
            split,
            rows: vec![Vec::new(); split.unknown_count()],
        }
    }

    /// Add `value` at `(pixel_row, pixel_col)`; ignored unless the row pixel is unknown.
    pub fn add(&mut self, pixel_row: usize, pixel_col: usize, value: f64) {
        if let Some(row) = self.split.unknown_position(pixel_row) {
            self.rows[row].push((pixel_col, value));
        }
    }

    pub fn build(self) -> RowMatrix {
        let mut matrix = RowMatrix {
            row_offsets: Vec::with_capacity(self.rows.len() + 1),
            ..RowMatrix::default()
        };
        matrix.row_offsets.push(0);

        for (row, mut entries) in self.rows.into_iter().enumerate() {
            entries.sort_unstable_by_key(|&(col, _)| col);
            let own_id = self.split.unknown[row];
            let mut diagonal = 0.0;
            let mut last: Option<usize> = None;
            for (col, value) in entries {
                if col == own_id {
                    diagonal += value;
                }
                match (last, matrix.values.last_mut()) {
                    (Some(prev), Some(slot)) if prev == col => *slot += value,
                    _ => {
                        matrix.columns.push(col);
                        matrix.values.push(value);
                    }
                }
                last = Some(col);
            }
            matrix.diagonal.push(diagonal);
            matrix.row_offsets.push(matrix.values.len());
        }
        matrix
    }
}

/// Pixels of a 3x3 window, row-major.
pub const WINDOW_PIXELS: usize = 9;

/// Colors of one 3x3 window.
pub type WindowColors = [[f64; 3]; WINDOW_PIXELS];

/// Local Laplacian of one window, indexed like [`WindowColors`].
pub type WindowLaplacian = [[f64; WINDOW_PIXELS]; WINDOW_PIXELS];

/// Sum local 3x3 window Laplacians into the unknown rows of `L`. Only
/// windows lying fully inside the image and containing an unknown pixel
/// contribute.
pub fn assemble_windows<F>(grid: &ColorGrid, split: &TrimapSplit, local: F) -> Result<RowMatrix>
where
    F: Fn(&WindowColors) -> Option<WindowLaplacian>,
{
    let mut builder = RowMatrixBuilder::new(split);
    let (width, height) = (grid.width, grid.height);
    if width < 3 || height < 3 {
        return Ok(builder.build());
    }

    let mut windows = 0usize;
    for wy in 0..height - 2 {
        for wx in 0..width - 2 {
            let mut ids = [0usize; WINDOW_PIXELS];
            for (k, id) in ids.iter_mut().enumerate() {
                *id = (wy + k / 3) * width + wx + k % 3;
            }
            if !ids.iter().any(|&id| split.is_unknown(id)) {
                continue;
            }

            let colors: WindowColors = ids.map(|id| grid.pixels[id]);
            let lw = local(&colors).ok_or(SolverError::Singular {
                x: wx as u32 + 1,
                y: wy as u32 + 1,
            })?;

            for (i, &row_id) in ids.iter().enumerate() {
                if !split.is_unknown(row_id) {
                    continue;
                }
                for (j, &col_id) in ids.iter().enumerate() {
                    builder.add(row_id, col_id, lw[i][j]);
                }
            }
            windows += 1;
        }
    }

    let matrix = builder.build();
    debug!(windows, rows = matrix.rows(), nnz = matrix.nnz(), "Assembled window Laplacian");
    Ok(matrix)
}

/// Solve the reduced system for the unknown pixels and compose the full,
/// clipped alpha matte.
pub fn solve_reduced<L: LaplacianOperator>(operator: &L, split: &TrimapSplit, config: &CgConfig) -> Result<GrayF32Image> {
    if split.unknown_count() == 0 {
        return Ok(split.compose(&[]));
    }

    let n = split.unknown_count();
    let mut rhs = vec![0.0; n];
    operator.apply_unknown_rows(&split.known_alpha, &mut rhs);
    rhs.iter_mut().for_each(|v| *v = -*v);

    let full_len = split.len();
    let apply = |y: &[f64], out: &mut [f64]| {
        let mut full = vec![0.0; full_len];
        for (&id, &v) in split.unknown.iter().zip(y) {
            full[id] = v;
        }
        operator.apply_unknown_rows(&full, out);
    };

    let outcome = cg::solve(apply, &operator.unknown_diagonal(), &rhs, config)?;
    debug!(
        unknowns = n,
        iterations = outcome.iterations,
        converged = outcome.converged,
        "Solved reduced system"
    );
    Ok(split.compose(&outcome.solution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Path graph Laplacian over a 1-row image.
    fn path_laplacian(split: &TrimapSplit) -> RowMatrix {
        let mut builder = RowMatrixBuilder::new(split);
        for i in 0..split.len() - 1 {
            builder.add(i, i, 1.0);
            builder.add(i, i + 1, -1.0);
            builder.add(i + 1, i + 1, 1.0);
            builder.add(i + 1, i, -1.0);
        }
        builder.build()
    }

    #[test]
    fn test_builder_merges_duplicates() {
        let trimap = GrayF32Image::from_fn(3, 1, |x, _| Luma([[0.0, 0.5, 1.0][x as usize]]));
        let split = TrimapSplit::new(&trimap);
        let matrix = path_laplacian(&split);

        assert_eq!(matrix.rows(), 1);
        let row: Vec<(usize, f64)> = matrix.row(0).collect();
        assert_eq!(row, vec![(0, -1.0), (1, 2.0), (2, -1.0)]);
        assert_eq!(matrix.unknown_diagonal(), vec![2.0]);
    }

    #[test]
    fn test_reduced_solve_interpolates_path() {
        let trimap = GrayF32Image::from_fn(5, 1, |x, _| Luma([[0.0, 0.5, 0.5, 0.5, 1.0][x as usize]]));
        let split = TrimapSplit::new(&trimap);
        let alpha = solve_reduced(&path_laplacian(&split), &split, &CgConfig::default()).expect("Should solve");

        let values: Vec<f32> = alpha.pixels().map(|p| p[0]).collect();
        for (got, want) in values.iter().zip([0.0, 0.25, 0.5, 0.75, 1.0]) {
            assert!((got - want).abs() < 1e-4, "{values:?}");
        }
    }

    #[test]
    fn test_small_image_has_no_windows() {
        let trimap = GrayF32Image::from_pixel(2, 2, Luma([0.5]));
        let split = TrimapSplit::new(&trimap);
        let grid = ColorGrid {
            width: 2,
            height: 2,
            pixels: vec![[0.0; 3]; 4],
        };
        let matrix = assemble_windows(&grid, &split, |_| None).expect("Should assemble");
        assert_eq!(matrix.nnz(), 0);
    }
}

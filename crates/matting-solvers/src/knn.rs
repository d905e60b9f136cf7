//! KNN matting (Chen et al.): a graph Laplacian over nearest neighbors in a
//! color plus position feature space.

use image::Rgb32FImage;
use matting::{AlphaSolver, BoxError, GrayF32Image};
use rstar::{primitives::GeomWithData, RTree};
use tracing::debug;

use crate::{
    cg::CgConfig,
    error::{Result, SolverError},
    grid::{check_shapes, ColorGrid, TrimapSplit},
    laplacian::{solve_reduced, RowMatrix, RowMatrixBuilder},
};

type Feature = GeomWithData<[f64; 5], usize>;

/// One neighbor query: `k` neighbors with pixel coordinates scaled by `spatial_weight`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborQuery {
    pub k: usize,
    pub spatial_weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnSolver {
    pub queries: Vec<NeighborQuery>,
    pub cg: CgConfig,
}

impl Default for KnnSolver {
    fn default() -> Self {
        Self {
            queries: vec![
                NeighborQuery { k: 20, spatial_weight: 2.0 },
                NeighborQuery { k: 10, spatial_weight: 0.1 },
            ],
            cg: CgConfig::default(),
        }
    }
}

fn linspace(i: usize, n: usize) -> f64 {
    if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 }
}

fn features(grid: &ColorGrid, spatial_weight: f64) -> Vec<Feature> {
    grid.pixels
        .iter()
        .enumerate()
        .map(|(id, c)| {
            let x = linspace(id % grid.width, grid.width);
            let y = linspace(id / grid.width, grid.height);
            GeomWithData::new([c[0], c[1], c[2], spatial_weight * x, spatial_weight * y], id)
        })
        .collect()
}

impl KnnSolver {
    /// `L = D - W` with `W = A + Aᵀ`, where `A[i][j] = 1` when `j` is among
    /// the neighbors of `i` (each pixel counts as its own neighbor).
    pub fn laplacian(&self, grid: &ColorGrid, split: &TrimapSplit) -> Result<RowMatrix> {
        if self.queries.iter().any(|q| q.k == 0) {
            return Err(SolverError::InvalidParameter("neighbor count must be at least 1".to_string()));
        }

        let mut builder = RowMatrixBuilder::new(split);
        let mut degree = vec![0.0; grid.len()];

        for query in &self.queries {
            let points = features(grid, query.spatial_weight);
            let tree = RTree::bulk_load(points.clone());
            for point in &points {
                let i = point.data;
                for neighbor in tree.nearest_neighbor_iter(point.geom()).take(query.k) {
                    let j = neighbor.data;
                    builder.add(i, j, -1.0);
                    builder.add(j, i, -1.0);
                    degree[i] += 1.0;
                    degree[j] += 1.0;
                }
            }
            debug!(k = query.k, spatial_weight = query.spatial_weight, "Collected nearest neighbors");
        }

        for &id in &split.unknown {
            builder.add(id, id, degree[id]);
        }
        Ok(builder.build())
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

impl AlphaSolver for KnnSolver {
    fn solve(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> std::result::Result<GrayF32Image, BoxError> {
        Ok(self.solve_alpha(image, trimap)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laplacian::LaplacianOperator;
    use crate::test_support::{assert_two_tone_alpha, column_trimap, two_tone};

    #[test]
    fn test_rows_sum_to_zero() {
        let image = two_tone(8, 6);
        let trimap = column_trimap(8, 6, 2, 6);
        let split = TrimapSplit::new(&trimap);
        let laplacian = KnnSolver::default()
            .laplacian(&ColorGrid::new(&image), &split)
            .expect("Should build Laplacian");

        let mut out = vec![0.0; split.unknown_count()];
        laplacian.apply_unknown_rows(&vec![1.0; split.len()], &mut out);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
        assert!(laplacian.unknown_diagonal().iter().all(|&d| d > 0.0));
    }

    #[test]
    fn test_two_tone_edge() {
        let image = two_tone(12, 12);
        let trimap = column_trimap(12, 12, 3, 9);
        let alpha = KnnSolver::default().solve_alpha(&image, &trimap).expect("Should solve");
        assert_two_tone_alpha(&alpha, 3, 9);
    }

    #[test]
    fn test_zero_neighbors_is_rejected() {
        let solver = KnnSolver {
            queries: vec![NeighborQuery { k: 0, spatial_weight: 1.0 }],
            ..KnnSolver::default()
        };
        let err = solver
            .solve_alpha(&two_tone(4, 4), &column_trimap(4, 4, 1, 3))
            .unwrap_err();
        assert!(matches!(err, SolverError::InvalidParameter(_)));
    }
}

//! Classical alpha matting solvers and foreground estimation.
//!
//! Every alpha solver builds a matting Laplacian `L` over the image and
//! solves for the unknown trimap band with known pixels held fixed. The
//! reduced system `L_UU x_U = -L_UK x_K` is solved with a Jacobi
//! preconditioned conjugate gradient; results are clipped to [0, 1].
//!
//! | Solver | Laplacian |
//! |--------|-----------|
//! | [`ClosedFormSolver`] | Levin et al., 3x3 windows, explicit |
//! | [`KnnSolver`] | Nearest neighbor graph in color and position |
//! | [`LbdmSolver`] | Local ridge regression, 3x3 windows, explicit |
//! | [`LkmSolver`] | Closed form over large windows, matrix-free |
//!
//! [`BlurFusion`] recovers foreground colors from an image and its alpha.

pub mod blur_fusion;
pub mod boxfilter;
pub mod cg;
pub mod closed_form;
pub mod error;
pub mod grid;
pub mod knn;
pub mod laplacian;
pub mod lbdm;
pub mod linalg;
pub mod lkm;

#[cfg(test)]
mod test_support;

use matting::{Algorithm, MattingPipelineBuilder};

pub use blur_fusion::BlurFusion;
pub use cg::CgConfig;
pub use closed_form::ClosedFormSolver;
pub use error::{Result, SolverError};
pub use knn::{KnnSolver, NeighborQuery};
pub use lbdm::LbdmSolver;
pub use lkm::LkmSolver;

/// Register every classical solver with default parameters and Blur-Fusion
/// as the foreground solver.
pub fn with_classical_solvers(builder: MattingPipelineBuilder) -> MattingPipelineBuilder {
    builder
        .with_solver(Algorithm::ClosedForm, ClosedFormSolver::default())
        .with_solver(Algorithm::Knn, KnnSolver::default())
        .with_solver(Algorithm::Lbdm, LbdmSolver::default())
        .with_solver(Algorithm::Lkm, LkmSolver::default())
        .with_foreground_solver(BlurFusion::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use matting::MattingPipeline;

    #[test]
    fn test_all_classical_algorithms_registered() {
        let pipeline = with_classical_solvers(MattingPipeline::builder()).build();
        for algorithm in [Algorithm::ClosedForm, Algorithm::Knn, Algorithm::Lbdm, Algorithm::Lkm, Algorithm::VitMatte] {
            assert!(pipeline.registry().contains(algorithm), "{algorithm} missing");
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Image is {image:?} but trimap is {trimap:?}")]
    ShapeMismatch { image: (u32, u32), trimap: (u32, u32) },

    #[error("Singular local system in window at ({x}, {y})")]
    Singular { x: u32, y: u32 },

    #[error("Solution is not finite after {iterations} iterations")]
    NonFinite { iterations: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, SolverError>;

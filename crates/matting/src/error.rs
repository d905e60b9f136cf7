use thiserror::Error;

/// Boxed error produced by an external collaborator (solver or model).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum MattingError {
    #[error("Shape mismatch in {stage}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        stage: &'static str,
        /// (width, height)
        expected: (u32, u32),
        /// (width, height)
        actual: (u32, u32),
    },

    #[error("Invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("Matting algorithm {algorithm} failed: {source}")]
    MattingFailure {
        algorithm: String,
        #[source]
        source: BoxError,
    },

    #[error("Model is not initialized: {0}")]
    ModelUnavailable(String),

    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Failed to encode {raster}: {source}")]
    Encode {
        raster: &'static str,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MattingError {
    /// Wrap a collaborator failure, keeping the original error as the source.
    pub fn failure(algorithm: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::MattingFailure {
            algorithm: algorithm.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MattingError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to run model script: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model script failed with {status}: {stderr}")]
    ScriptFailed { status: String, stderr: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Invalid JSON from model script: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to exchange image with model script: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

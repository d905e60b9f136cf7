use image::{GrayImage, Rgb32FImage, RgbImage};

use crate::{
    error::{BoxError, Result},
    types::{AutoSegmentParams, GrayF32Image, MaskProposal},
};

/// Pipeline-facing alpha estimation capability. One implementation per
/// algorithm, selected through the dispatcher's lookup table.
pub trait AlphaEstimator: Send + Sync {
    /// Estimate alpha from an image and a trimap, both scaled to [0, 1] and
    /// sharing the same dimensions.
    fn estimate_alpha(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> Result<GrayF32Image>;
}

/// Classical alpha solver treating the trimap's unknown band as unknowns of a
/// linear or graph-based system.
pub trait AlphaSolver: Send + Sync {
    fn solve(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> std::result::Result<GrayF32Image, BoxError>;
}

/// Foreground color estimation from image and alpha.
pub trait ForegroundSolver: Send + Sync {
    /// Returns the foreground RGB estimate in [0, 1]; the background estimate is discarded.
    fn solve(&self, image: &Rgb32FImage, alpha: &GrayF32Image) -> std::result::Result<Rgb32FImage, BoxError>;
}

/// Pretrained neural matting network.
pub trait NeuralMattingModel: Send + Sync {
    /// Run inference on an 8-bit image and trimap of identical, network
    /// compatible dimensions. Returns alpha with the same dimensions.
    fn infer(&self, image: &RgbImage, trimap: &GrayImage) -> std::result::Result<GrayF32Image, BoxError>;
}

/// Automatic mask generator (segment everything).
pub trait SegmentationModel: Send + Sync {
    fn generate(&self, image: &RgbImage, params: &AutoSegmentParams) -> std::result::Result<Vec<MaskProposal>, BoxError>;
}

/// Prompt-based predictor refining a rough mask prompt.
pub trait PromptPredictor: Send + Sync {
    /// Returns candidate masks and their scores, index aligned.
    fn predict(&self, image: &RgbImage, mask_prompt: &GrayImage) -> std::result::Result<(Vec<GrayImage>, Vec<f32>), BoxError>;
}

//! Alpha estimation dispatch.
//!
//! Every algorithm is an [`AlphaEstimator`] registered under its
//! [`Algorithm`] key. The pipeline looks the estimator up and calls it, so a
//! new solver only needs a new registry entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use image::{GrayImage, Luma, Rgb32FImage, RgbImage};
use tracing::{debug, instrument, warn};

use crate::{
    error::{MattingError, Result},
    raster::{ensure_same_size, unit_to_rgb},
    resize::Dimensions,
    traits::{AlphaEstimator, AlphaSolver, NeuralMattingModel},
    types::{Algorithm, GrayF32Image},
};

/// Tolerance used when checking that certain regions kept their alpha.
const KNOWN_REGION_TOLERANCE: f32 = 1e-3;

/// Normalized trimap value of the unknown class (128 / 255).
const UNKNOWN_LEVEL: f32 = 128.0 / 255.0;

fn check_inputs(stage: &'static str, image: &Rgb32FImage, trimap: &GrayF32Image) -> Result<()> {
    ensure_same_size(stage, Dimensions::of(image), Dimensions::of(trimap))
}

/// Count pixels where the alpha contradicts the trimap's certain regions.
/// Returns `(background_violations, foreground_violations)`.
fn known_region_violations(trimap: &GrayF32Image, alpha: &GrayF32Image) -> (u64, u64) {
    trimap
        .pixels()
        .zip(alpha.pixels())
        .fold((0, 0), |(bg, fg), (t, a)| {
            let (t, a) = (t[0], a[0]);
            if t <= 0.0 && a.abs() > KNOWN_REGION_TOLERANCE {
                (bg + 1, fg)
            } else if t >= 1.0 && (1.0 - a).abs() > KNOWN_REGION_TOLERANCE {
                (bg, fg + 1)
            } else {
                (bg, fg)
            }
        })
}

fn report_violations(algorithm: Algorithm, trimap: &GrayF32Image, alpha: &GrayF32Image) {
    let (background, foreground) = known_region_violations(trimap, alpha);
    if background > 0 || foreground > 0 {
        warn!(
            %algorithm,
            background, foreground, "Solver output contradicts the trimap's certain regions"
        );
    }
}

/// Adapter from a classical [`AlphaSolver`] to the dispatcher capability.
pub struct ClassicalEstimator {
    algorithm: Algorithm,
    solver: Arc<dyn AlphaSolver>,
}

impl ClassicalEstimator {
    pub fn new(algorithm: Algorithm, solver: Arc<dyn AlphaSolver>) -> Self {
        Self { algorithm, solver }
    }
}

impl AlphaEstimator for ClassicalEstimator {
    fn estimate_alpha(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> Result<GrayF32Image> {
        check_inputs("alpha estimation", image, trimap)?;

        let alpha = self
            .solver
            .solve(image, trimap)
            .map_err(|source| MattingError::failure(self.algorithm.as_str(), source))?;

        ensure_same_size("alpha solver output", Dimensions::of(trimap), Dimensions::of(&alpha))?;
        report_violations(self.algorithm, trimap, &alpha);
        Ok(alpha)
    }
}

/// Input formatting adapter for a pretrained ViTMatte network.
///
/// The network wants 8-bit inputs whose sides are multiples of its patch
/// size, so inputs are zero padded on the right and bottom and the output is
/// cropped back.
pub struct VitMatteEstimator {
    model: Option<Arc<dyn NeuralMattingModel>>,
}

impl VitMatteEstimator {
    pub const PATCH_SIZE: u32 = 32;

    pub fn new(model: Option<Arc<dyn NeuralMattingModel>>) -> Self {
        Self { model }
    }

    fn padded(side: u32) -> u32 {
        side.div_ceil(Self::PATCH_SIZE) * Self::PATCH_SIZE
    }
}

impl AlphaEstimator for VitMatteEstimator {
    fn estimate_alpha(&self, image: &Rgb32FImage, trimap: &GrayF32Image) -> Result<GrayF32Image> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| MattingError::ModelUnavailable("ViTMatte model".to_string()))?;
        check_inputs("alpha estimation", image, trimap)?;

        let (width, height) = image.dimensions();
        let padded = Dimensions::new(Self::padded(width), Self::padded(height));
        debug!(width, height, padded_width = padded.width, padded_height = padded.height, "Formatting ViTMatte inputs");

        let rgb = unit_to_rgb(image);
        let net_image = RgbImage::from_fn(padded.width, padded.height, |x, y| {
            if x < width && y < height { *rgb.get_pixel(x, y) } else { image::Rgb([0, 0, 0]) }
        });
        let net_trimap = GrayImage::from_fn(padded.width, padded.height, |x, y| {
            if x < width && y < height {
                let t = trimap.get_pixel(x, y)[0];
                Luma([if t <= 0.0 { 0 } else if t >= 1.0 { 255 } else { 128 }])
            } else {
                Luma([0])
            }
        });

        let raw = model
            .infer(&net_image, &net_trimap)
            .map_err(|source| MattingError::failure(Algorithm::VitMatte.as_str(), source))?;
        ensure_same_size("vitmatte output", padded, Dimensions::of(&raw))?;

        let alpha = GrayF32Image::from_fn(width, height, |x, y| Luma([raw.get_pixel(x, y)[0].clamp(0.0, 1.0)]));
        report_violations(Algorithm::VitMatte, trimap, &alpha);
        Ok(alpha)
    }
}

/// Lookup table from algorithm to estimator.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    estimators: BTreeMap<Algorithm, Arc<dyn AlphaEstimator>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an estimator, replacing any previous one for the algorithm.
    pub fn register(&mut self, algorithm: Algorithm, estimator: Arc<dyn AlphaEstimator>) {
        self.estimators.insert(algorithm, estimator);
    }

    /// Register a classical solver under `algorithm`.
    pub fn register_solver(&mut self, algorithm: Algorithm, solver: Arc<dyn AlphaSolver>) {
        self.register(algorithm, Arc::new(ClassicalEstimator::new(algorithm, solver)));
    }

    pub fn contains(&self, algorithm: Algorithm) -> bool {
        self.estimators.contains_key(&algorithm)
    }

    /// Registered algorithms in selector order
    pub fn algorithms(&self) -> Vec<Algorithm> {
        self.estimators.keys().copied().collect()
    }

    pub fn get(&self, algorithm: Algorithm) -> Result<&Arc<dyn AlphaEstimator>> {
        self.estimators.get(&algorithm).ok_or_else(|| {
            MattingError::InvalidAlgorithm(format!("{algorithm} has no registered estimator"))
        })
    }

    /// Estimate alpha with the estimator registered for `algorithm`.
    #[instrument(skip_all, fields(%algorithm))]
    pub fn estimate_alpha(&self, algorithm: Algorithm, image: &Rgb32FImage, trimap: &GrayF32Image) -> Result<GrayF32Image> {
        let estimator = self.get(algorithm)?;
        estimator.estimate_alpha(image, trimap)
    }
}

/// Whether a normalized trimap value is the unknown class.
pub fn is_unknown_level(value: f32) -> bool {
    (value - UNKNOWN_LEVEL).abs() < 1e-3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;

    /// Copies the trimap, with unknown pixels at `fill`.
    struct TrimapCopySolver {
        fill: f32,
    }

    impl AlphaSolver for TrimapCopySolver {
        fn solve(&self, _image: &Rgb32FImage, trimap: &GrayF32Image) -> std::result::Result<GrayF32Image, BoxError> {
            Ok(GrayF32Image::from_fn(trimap.width(), trimap.height(), |x, y| {
                let t = trimap.get_pixel(x, y)[0];
                Luma([if is_unknown_level(t) { self.fill } else { t }])
            }))
        }
    }

    struct FailingSolver;

    impl AlphaSolver for FailingSolver {
        fn solve(&self, _image: &Rgb32FImage, _trimap: &GrayF32Image) -> std::result::Result<GrayF32Image, BoxError> {
            Err("matrix is singular".into())
        }
    }

    struct ConstantModel;

    impl NeuralMattingModel for ConstantModel {
        fn infer(&self, image: &RgbImage, trimap: &GrayImage) -> std::result::Result<GrayF32Image, BoxError> {
            assert_eq!(image.dimensions(), trimap.dimensions());
            assert_eq!(image.width() % 32, 0);
            assert_eq!(image.height() % 32, 0);
            Ok(GrayF32Image::from_pixel(image.width(), image.height(), Luma([1.5])))
        }
    }

    fn inputs(width: u32, height: u32) -> (Rgb32FImage, GrayF32Image) {
        let image = Rgb32FImage::from_pixel(width, height, image::Rgb([0.5, 0.5, 0.5]));
        let trimap = GrayF32Image::from_fn(width, height, |x, _| {
            Luma([match x % 3 {
                0 => 0.0,
                1 => UNKNOWN_LEVEL,
                _ => 1.0,
            }])
        });
        (image, trimap)
    }

    #[test]
    fn test_registry_dispatches_to_registered_solver() {
        let mut registry = AlgorithmRegistry::new();
        registry.register_solver(Algorithm::Knn, Arc::new(TrimapCopySolver { fill: 0.25 }));

        let (image, trimap) = inputs(9, 4);
        let alpha = registry
            .estimate_alpha(Algorithm::Knn, &image, &trimap)
            .expect("Should estimate alpha");
        assert_eq!(alpha.get_pixel(1, 0)[0], 0.25);
        assert_eq!(alpha.get_pixel(2, 0)[0], 1.0);
    }

    #[test]
    fn test_unregistered_algorithm_is_invalid() {
        let registry = AlgorithmRegistry::new();
        let (image, trimap) = inputs(3, 3);
        let err = registry.estimate_alpha(Algorithm::Lkm, &image, &trimap).unwrap_err();
        assert!(matches!(err, MattingError::InvalidAlgorithm(_)));
    }

    #[test]
    fn test_solver_failure_is_wrapped() {
        let estimator = ClassicalEstimator::new(Algorithm::ClosedForm, Arc::new(FailingSolver));
        let (image, trimap) = inputs(3, 3);
        let err = estimator.estimate_alpha(&image, &trimap).unwrap_err();
        match err {
            MattingError::MattingFailure { algorithm, source } => {
                assert_eq!(algorithm, "cf");
                assert_eq!(source.to_string(), "matrix is singular");
            }
            other => panic!("Unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let estimator = ClassicalEstimator::new(Algorithm::ClosedForm, Arc::new(TrimapCopySolver { fill: 0.5 }));
        let image = Rgb32FImage::new(4, 4);
        let trimap = GrayF32Image::new(4, 5);
        let err = estimator.estimate_alpha(&image, &trimap).unwrap_err();
        assert!(matches!(
            err,
            MattingError::ShapeMismatch { expected: (4, 4), actual: (4, 5), .. }
        ));
    }

    #[test]
    fn test_vitmatte_without_model_is_unavailable() {
        let estimator = VitMatteEstimator::new(None);
        let (image, trimap) = inputs(10, 10);
        let err = estimator.estimate_alpha(&image, &trimap).unwrap_err();
        assert!(matches!(err, MattingError::ModelUnavailable(_)));
    }

    #[test]
    fn test_vitmatte_pads_and_crops() {
        let estimator = VitMatteEstimator::new(Some(Arc::new(ConstantModel)));
        let (image, trimap) = inputs(45, 20);
        let alpha = estimator.estimate_alpha(&image, &trimap).expect("Should run model");
        assert_eq!(alpha.dimensions(), (45, 20));
        assert!(alpha.pixels().all(|p| p[0] == 1.0));
    }
}

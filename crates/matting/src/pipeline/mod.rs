pub mod builder;

use std::sync::Arc;
use std::time::Instant;

use image::{GrayImage, RgbImage};
use tracing::{debug, error, info, instrument};

use crate::{
    assemble::{assemble, WorkingRasters},
    dispatch::AlgorithmRegistry,
    error::Result,
    foreground::{estimate_foreground, has_support},
    raster::{ensure_same_size, rgb_to_unit},
    resize::{normalize, resize_nearest, Dimensions},
    traits::ForegroundSolver,
    trimap::{build_trimap, Trimap},
    types::{Algorithm, MatteResult, MattingParams},
};

/// The five-stage matting pipeline: resize, trimap, alpha, foreground,
/// assembly.
///
/// The pipeline holds no mutable state; solver and model handles are shared
/// through `Arc` and may be used from several threads at once.
pub struct MattingPipeline {
    registry: AlgorithmRegistry,
    foreground_solver: Option<Arc<dyn ForegroundSolver>>,
}

impl MattingPipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::MattingPipelineBuilder {
        builder::MattingPipelineBuilder::new()
    }

    pub fn new(registry: AlgorithmRegistry, foreground_solver: Option<Arc<dyn ForegroundSolver>>) -> Self {
        Self {
            registry,
            foreground_solver,
        }
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Generate an alpha matte from an image and a rough selection mask.
    ///
    /// Errors from any stage are logged and returned unchanged.
    #[instrument(skip_all, fields(algorithm = %params.algorithm))]
    pub fn generate_matte(&self, image: &RgbImage, mask: &GrayImage, params: &MattingParams) -> Result<MatteResult> {
        self.run_generate(image, mask, params).inspect_err(|err| {
            error!("Matte generation failed: {err}");
        })
    }

    /// Generate an alpha matte from a caller-supplied trimap.
    ///
    /// The trimap is snapped to three classes after resampling. Kernel sizes
    /// are echoed as 0 since no morphology runs.
    #[instrument(skip_all, fields(%algorithm))]
    pub fn matte_from_trimap(
        &self,
        image: &RgbImage,
        trimap: &GrayImage,
        max_size: u32,
        algorithm: Algorithm,
    ) -> Result<MatteResult> {
        self.run_from_trimap(image, trimap, max_size, algorithm).inspect_err(|err| {
            error!("Matting from trimap failed: {err}");
        })
    }

    fn run_generate(&self, image: &RgbImage, mask: &GrayImage, params: &MattingParams) -> Result<MatteResult> {
        let started = Instant::now();
        self.registry.get(params.algorithm)?;

        let (working_image, original) = normalize(image, params.max_size);
        let working = Dimensions::of(&working_image);
        let mask = resize_nearest(mask, working);
        ensure_same_size("trimap", working, Dimensions::of(&mask))?;

        let trimap = build_trimap(&mask, params.erosion_kernel_size, params.dilation_kernel_size);
        let rasters = self.solve(&working_image, trimap, params.algorithm)?;

        let result = assemble(image, rasters, params.algorithm, params.clone(), started)?;
        info!(
            "Generated matte for {}x{} image in {:.3}s",
            original.width, original.height, result.processing_time
        );
        Ok(result)
    }

    fn run_from_trimap(&self, image: &RgbImage, trimap: &GrayImage, max_size: u32, algorithm: Algorithm) -> Result<MatteResult> {
        let started = Instant::now();
        self.registry.get(algorithm)?;

        let (working_image, original) = normalize(image, max_size);
        let working = Dimensions::of(&working_image);
        let trimap = Trimap::from_gray(&resize_nearest(trimap, working));
        let rasters = self.solve(&working_image, trimap, algorithm)?;

        let parameters = MattingParams {
            erosion_kernel_size: 0,
            dilation_kernel_size: 0,
            max_size,
            algorithm,
        };
        let result = assemble(image, rasters, algorithm, parameters, started)?;
        info!(
            "Generated matte from trimap for {}x{} image in {:.3}s",
            original.width, original.height, result.processing_time
        );
        Ok(result)
    }

    /// Alpha and foreground at working resolution.
    fn solve(&self, image: &RgbImage, trimap: Trimap, algorithm: Algorithm) -> Result<WorkingRasters> {
        let image = rgb_to_unit(image);

        let alpha = if trimap.has_unknown() {
            self.registry.estimate_alpha(algorithm, &image, &trimap.to_normalized())?
        } else {
            debug!("Trimap has no unknown region, alpha follows the trimap");
            trimap.to_alpha()
        };

        let foreground = match &self.foreground_solver {
            Some(solver) if has_support(&alpha) => Some(estimate_foreground(solver.as_ref(), &image, &alpha)?),
            _ => None,
        };

        Ok(WorkingRasters {
            alpha,
            trimap: trimap.into_image(),
            foreground,
        })
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        let algorithms: Vec<&str> = self.registry.algorithms().iter().map(Algorithm::as_str).collect();
        format!(
            "MattingPipeline: algorithms [{}], foreground recovery {}",
            algorithms.join(", "),
            if self.foreground_solver.is_some() { "on" } else { "off" }
        )
    }
}

//! # Trimap and Alpha Matting Pipeline
//!
//! Turns an RGB image and a rough selection mask into a soft alpha matte and
//! a foreground layer suitable for compositing.
//!
//! ## Stages
//!
//! 1. **Resize**: scale the image so its longest side fits `max_size`.
//! 2. **Trimap**: erode and dilate the mask into certain foreground,
//!    certain background and an unknown band.
//! 3. **Alpha**: dispatch to the estimator registered for the requested
//!    [`Algorithm`].
//! 4. **Foreground**: recover unblended foreground colors.
//! 5. **Assembly**: restore the original resolution and encode every raster
//!    as base64 PNG.
//!
//! Solvers and models are collaborators injected through
//! [`MattingPipelineBuilder`]; the pipeline itself holds no mutable state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use matting::{MattingParams, MattingPipeline};
//! # use matting::{AlphaSolver, BoxError, GrayF32Image};
//! # use image::Rgb32FImage;
//! # struct MySolver;
//! # impl AlphaSolver for MySolver {
//! #     fn solve(&self, _: &Rgb32FImage, t: &GrayF32Image) -> Result<GrayF32Image, BoxError> { Ok(t.clone()) }
//! # }
//!
//! let pipeline = MattingPipeline::builder()
//!     .with_solver(matting::Algorithm::ClosedForm, MySolver)
//!     .build();
//!
//! let image = image::open("photo.jpg")?.to_rgb8();
//! let mask = image::open("mask.png")?.to_luma8();
//! let result = pipeline.generate_matte(&image, &mask, &MattingParams::default())?;
//!
//! result.write_rasters("out", "photo")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assemble;
pub mod config;
pub mod dispatch;
pub mod encode;
pub mod error;
pub mod foreground;
pub mod io;
pub mod pipeline;
pub mod raster;
pub mod resize;
pub mod segmentation;
pub mod service;
pub mod traits;
pub mod trimap;
pub mod types;

pub use config::{Device, ModelScriptConfig, Sam2Variant, ServiceConfig, VitMatteVariant};
pub use dispatch::{AlgorithmRegistry, ClassicalEstimator, VitMatteEstimator};
pub use error::{BoxError, MattingError, Result};
pub use io::RasterPaths;
pub use pipeline::{builder::MattingPipelineBuilder, MattingPipeline};
pub use resize::{normalize, Dimensions};
pub use segmentation::Segmenter;
pub use service::{CommandInput, CommandOutput, MattingCommand, MattingService};
pub use traits::*;
pub use trimap::{build_trimap, StructuringElement, Trimap, TrimapCounts};
pub use types::*;

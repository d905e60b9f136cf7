use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use matting::{MattingError, MattingParams, MattingPipeline, MattingService, RasterPaths, Segmenter, ServiceConfig};
use matting_solvers::with_classical_solvers;
use model_bridge::ScriptModel;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    MattingError(#[from] MattingError),
    #[error("Job '{0}' needs either a 'mask' or a 'trimap'")]
    MissingSource(String),
    #[error("Job '{0}' sets both 'mask' and 'trimap'")]
    ConflictingSource(String),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// What a job derives its trimap from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobSource<'a> {
    Mask(&'a Path),
    Trimap(&'a Path),
}

/// One image to matte.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MatteJob {
    /// Stem of every file written for this job
    pub name: String,
    pub description: Option<String>,
    pub image: PathBuf,
    pub mask: Option<PathBuf>,
    pub trimap: Option<PathBuf>,
    /// Overrides the configured request defaults
    pub params: Option<MattingParams>,
}

impl MatteJob {
    pub fn source(&self) -> Result<JobSource<'_>, CliError> {
        match (&self.mask, &self.trimap) {
            (Some(mask), None) => Ok(JobSource::Mask(mask)),
            (None, Some(trimap)) => Ok(JobSource::Trimap(trimap)),
            (None, None) => Err(CliError::MissingSource(self.name.clone())),
            (Some(_), Some(_)) => Err(CliError::ConflictingSource(self.name.clone())),
        }
    }

    pub fn params_or(&self, defaults: &MattingParams) -> MattingParams {
        self.params.clone().unwrap_or_else(|| defaults.clone())
    }
}

/// Batch of matte jobs sharing an output directory
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BatchJobs {
    pub output_dir: PathBuf,
    /// Service configuration file; defaults apply when absent
    pub config: Option<PathBuf>,
    pub jobs: Vec<MatteJob>,
}

impl BatchJobs {
    /// Load BatchJobs from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(content)?)
    }

    /// Load BatchJobs from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load the batch
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Check every job before any work starts
    pub fn validate(&self) -> Result<(), CliError> {
        self.jobs.iter().try_for_each(|job| job.source().map(|_| ()))
    }
}

/// Service configuration from `path` (or defaults) with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, CliError> {
    let config = match path {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

/// Wire the classical solvers and, when a model script is configured, the
/// script backed models into a service.
pub fn build_service(config: &ServiceConfig) -> MattingService {
    let mut builder = with_classical_solvers(MattingPipeline::builder());
    if !config.compute_foreground {
        builder = builder.without_foreground();
    }

    let mut segmenter = Segmenter::default();
    match ScriptModel::from_config(config) {
        Some(model) => {
            let model = Arc::new(model);
            builder = builder.with_vitmatte_model(model.clone());
            segmenter = segmenter.with_model(model.clone()).with_predictor(model);
        }
        None => warn!("No model script configured; vitmatte and segmentation are unavailable"),
    }

    MattingService::new(builder.build()).with_segmenter(segmenter)
}

/// Run one job and write `<name>.json` plus its rasters into `output_dir`.
pub fn run_job(service: &MattingService, job: &MatteJob, output_dir: &Path, defaults: &MattingParams) -> Result<RasterPaths, CliError> {
    let image = image::open(&job.image)?.to_rgb8();
    let params = job.params_or(defaults);
    let pipeline = service.pipeline();

    let result = match job.source()? {
        JobSource::Mask(path) => {
            let mask = image::open(path)?.to_luma8();
            pipeline.generate_matte(&image, &mask, &params)?
        }
        JobSource::Trimap(path) => {
            let trimap = image::open(path)?.to_luma8();
            pipeline.matte_from_trimap(&image, &trimap, params.max_size, params.algorithm)?
        }
    };

    fs::create_dir_all(output_dir)?;
    result.save_json(output_dir.join(format!("{}.json", job.name)))?;
    let paths = result.write_rasters(output_dir, &job.name)?;
    info!(job = %job.name, seconds = result.processing_time, "Job finished");
    Ok(paths)
}

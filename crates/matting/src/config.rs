//! Service configuration, loadable from TOML or JSON with environment
//! overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};
use tracing::warn;

use crate::{
    error::{MattingError, Result},
    types::{AutoSegmentParams, MattingParams},
};

/// Accelerator passed through to model collaborators.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
    Mps,
}

impl Device {
    /// Parse case-insensitively, falling back to CPU for unknown names.
    pub fn parse_lenient(name: &str) -> Self {
        Self::from_str(&name.to_lowercase()).unwrap_or_else(|_| {
            warn!("Unknown device '{name}', falling back to 'cpu'");
            Self::Cpu
        })
    }
}

/// SAM2 checkpoint size.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sam2Variant {
    #[default]
    Tiny,
    Small,
    BasePlus,
    Large,
}

impl Sam2Variant {
    pub fn config_path(&self) -> &'static str {
        match self {
            Self::Tiny => "configs/sam2.1/sam2.1_hiera_t.yaml",
            Self::Small => "configs/sam2.1/sam2.1_hiera_s.yaml",
            Self::BasePlus => "configs/sam2.1/sam2.1_hiera_b+.yaml",
            Self::Large => "configs/sam2.1/sam2.1_hiera_l.yaml",
        }
    }

    pub fn checkpoint_path(&self) -> &'static str {
        match self {
            Self::Tiny => "checkpoints/sam2.1_hiera_tiny.pt",
            Self::Small => "checkpoints/sam2.1_hiera_small.pt",
            Self::BasePlus => "checkpoints/sam2.1_hiera_base_plus.pt",
            Self::Large => "checkpoints/sam2.1_hiera_large.pt",
        }
    }

    /// Parse case-insensitively. Unknown variants are a configuration error.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(&name.to_lowercase()).map_err(|_| {
            MattingError::Config(format!(
                "Invalid model variant '{name}'. Available: {}",
                Self::VARIANTS.join(", ")
            ))
        })
    }
}

/// ViTMatte checkpoint size.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VitMatteVariant {
    #[default]
    Small,
    Base,
}

impl VitMatteVariant {
    /// Hugging Face model id
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Small => "hustvl/vitmatte-small-composition-1k",
            Self::Base => "hustvl/vitmatte-base-composition-1k",
        }
    }

    pub fn parse_lenient(name: &str) -> Self {
        Self::from_str(&name.to_lowercase()).unwrap_or_else(|_| {
            warn!("Unknown ViTMatte model '{name}', falling back to 'small'");
            Self::Small
        })
    }
}

/// External model program reached through the model bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelScriptConfig {
    /// Script or executable implementing the bridge protocol
    pub script: PathBuf,
    /// Run the script with `uv run python`
    #[serde(default)]
    pub use_uv: bool,
    /// Working directory for the script
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ServiceConfig {
    pub sam2_model: Sam2Variant,
    pub device: Device,
    pub vitmatte_model: VitMatteVariant,
    /// Recover a foreground layer alongside the alpha matte
    pub compute_foreground: bool,
    /// Request defaults
    pub matting: MattingParams,
    pub segmentation: AutoSegmentParams,
    pub models: Option<ModelScriptConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sam2_model: Sam2Variant::default(),
            device: Device::default(),
            vitmatte_model: VitMatteVariant::default(),
            compute_foreground: true,
            matting: MattingParams::default(),
            segmentation: AutoSegmentParams::default(),
            models: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MattingError::Config(e.to_string()))
    }

    /// Load configuration from JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => Err(MattingError::Config(format!(
                "Unsupported file format for {}. Please use .toml or .json files",
                path.display()
            ))),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MattingError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply `MODEL`, `DEVICE` and `VITMATTE_MODEL` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("MODEL") {
            self.sam2_model = Sam2Variant::parse(&model)?;
        }
        if let Some(device) = lookup("DEVICE") {
            self.device = Device::parse_lenient(&device);
        }
        if let Some(variant) = lookup("VITMATTE_MODEL") {
            self.vitmatte_model = VitMatteVariant::parse_lenient(&variant);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Algorithm;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.matting.erosion_kernel_size, 10);
        assert_eq!(config.matting.max_size, 1024);
        assert_eq!(config.matting.algorithm, Algorithm::ClosedForm);
        assert_eq!(config.sam2_model.checkpoint_path(), "checkpoints/sam2.1_hiera_tiny.pt");
        assert!(config.compute_foreground);
    }

    #[test]
    fn test_partial_toml() {
        let config = ServiceConfig::from_toml(
            r#"
            device = "cuda"
            sam2_model = "base_plus"

            [matting]
            algorithm = "knn"
            max_size = 512
            "#,
        )
        .expect("Should parse TOML");
        assert_eq!(config.device, Device::Cuda);
        assert_eq!(config.sam2_model, Sam2Variant::BasePlus);
        assert_eq!(config.matting.algorithm, Algorithm::Knn);
        assert_eq!(config.matting.max_size, 512);
        assert_eq!(config.matting.dilation_kernel_size, 10);
    }

    #[test]
    fn test_env_overrides() {
        let config = ServiceConfig::default()
            .with_overrides(lookup(&[("MODEL", "LARGE"), ("DEVICE", "tpu"), ("VITMATTE_MODEL", "base")]))
            .expect("Should apply overrides");
        assert_eq!(config.sam2_model, Sam2Variant::Large);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.vitmatte_model.model_id(), "hustvl/vitmatte-base-composition-1k");
    }

    #[test]
    fn test_invalid_model_variant_is_config_error() {
        let err = ServiceConfig::default()
            .with_overrides(lookup(&[("MODEL", "huge")]))
            .unwrap_err();
        assert!(matches!(err, MattingError::Config(ref msg) if msg.contains("base_plus")));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let config = ServiceConfig {
            device: Device::Mps,
            ..ServiceConfig::default()
        };

        let toml_path = dir.path().join("service.toml");
        fs::write(&toml_path, config.to_toml().expect("Should serialize")).expect("Should write");
        assert_eq!(ServiceConfig::from_file(&toml_path).expect("Should load TOML"), config);

        let json_path = dir.path().join("service.json");
        fs::write(&json_path, config.to_json().expect("Should serialize")).expect("Should write");
        assert_eq!(ServiceConfig::from_file(&json_path).expect("Should load JSON"), config);

        let yaml_path = dir.path().join("service.yaml");
        fs::write(&yaml_path, "device: cpu").expect("Should write");
        assert!(matches!(ServiceConfig::from_file(&yaml_path), Err(MattingError::Config(_))));
    }
}

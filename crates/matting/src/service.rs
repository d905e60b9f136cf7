use std::sync::Arc;

use image::{DynamicImage, GrayImage, RgbImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use crate::{
    error::{MattingError, Result},
    pipeline::MattingPipeline,
    segmentation::Segmenter,
    types::{Algorithm, AutoSegmentParams, MatteResult, MattingParams, Segment, SegmentationResult},
};

#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum MattingCommand {
    /// Build a trimap from the mask and estimate the alpha matte
    #[serde(rename = "generate_matte")]
    GenerateMatte(MattingParams),

    /// Estimate the alpha matte from a ready trimap
    #[serde(rename = "matte_from_trimap")]
    MatteFromTrimap {
        #[schemars(range(min = 1))]
        max_size: u32,
        algorithm: Algorithm,
    },

    /// Segment everything in the image
    #[serde(rename = "auto_segment")]
    AutoSegment(AutoSegmentParams),

    /// Refine a rough mask prompt into a single segment
    #[serde(rename = "segment_from_prompt")]
    SegmentFromPrompt,
}

impl MattingCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(MattingCommand)
    }

    /// Get a list of all available command names
    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    /// Get a description of the command
    pub fn description(&self) -> &'static str {
        match self {
            Self::GenerateMatte(_) => "Generate an alpha matte and foreground layer from an image and a rough mask",
            Self::MatteFromTrimap { .. } => "Generate an alpha matte from an image and a ready trimap",
            Self::AutoSegment(_) => "Segment everything in the image with the segmentation model",
            Self::SegmentFromPrompt => "Refine a rough mask into the best scoring segment",
        }
    }

    /// Name of the second raster the command needs, if any
    pub fn secondary_input(&self) -> Option<&'static str> {
        match self {
            Self::GenerateMatte(_) | Self::SegmentFromPrompt => Some("mask"),
            Self::MatteFromTrimap { .. } => Some("trimap"),
            Self::AutoSegment(_) => None,
        }
    }
}

/// Encoded rasters a command runs on.
#[derive(Debug, Clone, Copy)]
pub struct CommandInput<'a> {
    pub image: &'a [u8],
    /// Mask or trimap, depending on the command
    pub secondary: Option<&'a [u8]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum CommandOutput {
    Matte(MatteResult),
    Segmentation(SegmentationResult),
    Segment(Segment),
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    Ok(decode(bytes)?.to_rgb8())
}

fn decode_gray(bytes: &[u8]) -> Result<GrayImage> {
    Ok(decode(bytes)?.to_luma8())
}

/// Byte-level front end over a shared pipeline and segmentation models.
#[derive(Clone)]
pub struct MattingService {
    pipeline: Arc<MattingPipeline>,
    segmenter: Segmenter,
}

impl MattingService {
    pub fn new(pipeline: MattingPipeline) -> Self {
        Self::with_shared_pipeline(Arc::new(pipeline))
    }

    pub fn with_shared_pipeline(pipeline: Arc<MattingPipeline>) -> Self {
        Self {
            pipeline,
            segmenter: Segmenter::default(),
        }
    }

    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn pipeline(&self) -> &MattingPipeline {
        &self.pipeline
    }

    /// Generate a matte from encoded image and mask bytes.
    pub fn generate_matte(&self, image: &[u8], mask: &[u8], params: &MattingParams) -> Result<MatteResult> {
        let image = decode_rgb(image)?;
        let mask = decode_gray(mask)?;
        self.pipeline.generate_matte(&image, &mask, params)
    }

    pub fn matte_from_trimap(&self, image: &[u8], trimap: &[u8], max_size: u32, algorithm: Algorithm) -> Result<MatteResult> {
        let image = decode_rgb(image)?;
        let trimap = decode_gray(trimap)?;
        self.pipeline.matte_from_trimap(&image, &trimap, max_size, algorithm)
    }

    pub fn auto_segment(&self, image: &[u8], params: &AutoSegmentParams) -> Result<SegmentationResult> {
        let image = decode_rgb(image)?;
        self.segmenter.auto_segment(&image, params)
    }

    pub fn segment_from_prompt(&self, image: &[u8], mask_prompt: &[u8]) -> Result<Segment> {
        let image = decode_rgb(image)?;
        let mask_prompt = decode_gray(mask_prompt)?;
        self.segmenter.segment_from_prompt(&image, &mask_prompt)
    }

    pub fn execute(&self, command: &MattingCommand, input: CommandInput<'_>) -> Result<CommandOutput> {
        debug!(command = %command, "Executing command");
        let secondary = || match (command.secondary_input(), input.secondary) {
            (Some(_), Some(bytes)) => Ok(bytes),
            (Some(name), None) => Err(MattingError::MissingInput(name)),
            (None, _) => Err(MattingError::MissingInput("secondary raster")),
        };

        match command {
            MattingCommand::GenerateMatte(params) => {
                self.generate_matte(input.image, secondary()?, params).map(CommandOutput::Matte)
            }
            MattingCommand::MatteFromTrimap { max_size, algorithm } => self
                .matte_from_trimap(input.image, secondary()?, *max_size, *algorithm)
                .map(CommandOutput::Matte),
            MattingCommand::AutoSegment(params) => {
                self.auto_segment(input.image, params).map(CommandOutput::Segmentation)
            }
            MattingCommand::SegmentFromPrompt => {
                self.segment_from_prompt(input.image, secondary()?).map(CommandOutput::Segment)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let cmd = MattingCommand::MatteFromTrimap {
            max_size: 512,
            algorithm: Algorithm::Lkm,
        };
        let json = serde_json::to_string(&cmd).expect("Should serialize");
        assert!(json.contains("\"type\":\"matte_from_trimap\""));
        assert!(json.contains("\"algorithm\":\"lkm\""));

        let parsed: MattingCommand = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(cmd, parsed);
    }

    #[test]
    fn test_generate_matte_params_default_when_partial() {
        let json = r#"{"type": "generate_matte", "params": {"algorithm": "knn"}}"#;
        let cmd: MattingCommand = serde_json::from_str(json).expect("Should deserialize");
        match cmd {
            MattingCommand::GenerateMatte(params) => {
                assert_eq!(params.algorithm, Algorithm::Knn);
                assert_eq!(params.erosion_kernel_size, 10);
            }
            other => panic!("Unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_bogus_algorithm_is_rejected_at_parse() {
        let json = r#"{"type": "generate_matte", "params": {"algorithm": "bogus"}}"#;
        assert!(serde_json::from_str::<MattingCommand>(json).is_err());
    }

    #[test]
    fn test_command_names_and_schema() {
        assert_eq!(
            MattingCommand::command_names(),
            &["generate_matte", "matte_from_trimap", "auto_segment", "segment_from_prompt"]
        );
        let schema = serde_json::to_value(MattingCommand::schema()).expect("Should serialize schema");
        assert!(schema.to_string().contains("matte_from_trimap"));
    }

    #[test]
    fn test_missing_secondary_input() {
        let service = MattingService::new(MattingPipeline::builder().build());
        let err = service
            .execute(
                &MattingCommand::GenerateMatte(MattingParams::default()),
                CommandInput { image: b"", secondary: None },
            )
            .unwrap_err();
        assert!(matches!(err, MattingError::MissingInput("mask")));
    }

    #[test]
    fn test_undecodable_image_is_load_error() {
        let service = MattingService::new(MattingPipeline::builder().build());
        let err = service
            .generate_matte(b"definitely not an image", b"", &MattingParams::default())
            .unwrap_err();
        assert!(matches!(err, MattingError::ImageLoad(_)));
    }
}

use std::collections::BTreeMap;
use std::str::FromStr;

use image::{GrayImage, ImageBuffer, Luma};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{MattingError, Result};

/// Single-channel floating point raster (alpha fields, normalized trimaps).
pub type GrayF32Image = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Alpha estimation strategy selector.
///
/// String forms are case-sensitive: `cf`, `knn`, `lbdm`, `lkm`, `vitmatte`.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash, PartialOrd, Ord
)]
pub enum Algorithm {
    /// Closed-form matting
    #[default]
    #[strum(serialize = "cf")]
    #[serde(rename = "cf")]
    ClosedForm,

    /// KNN matting
    #[strum(serialize = "knn")]
    #[serde(rename = "knn")]
    Knn,

    /// Learning-based digital matting
    #[strum(serialize = "lbdm")]
    #[serde(rename = "lbdm")]
    Lbdm,

    /// Large-kernel matting Laplacian
    #[strum(serialize = "lkm")]
    #[serde(rename = "lkm")]
    Lkm,

    /// Pretrained ViTMatte network
    #[strum(serialize = "vitmatte")]
    #[serde(rename = "vitmatte")]
    VitMatte,
}

impl Algorithm {
    /// Parse a selector, mapping unknown names to [`MattingError::InvalidAlgorithm`].
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name).map_err(|_| {
            MattingError::InvalidAlgorithm(format!(
                "{name}. Valid options: {}",
                Self::VARIANTS.join(", ")
            ))
        })
    }

    /// Get the selector string
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Per-request matting parameters, echoed back in the result bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MattingParams {
    /// Diameter of the disk used to erode the mask into certain foreground
    pub erosion_kernel_size: u32,
    /// Diameter of the disk used to dilate the mask into the unknown band
    pub dilation_kernel_size: u32,
    /// Longest side of the working image
    #[schemars(range(min = 1))]
    pub max_size: u32,
    /// Alpha estimation strategy
    pub algorithm: Algorithm,
}

impl Default for MattingParams {
    fn default() -> Self {
        Self {
            erosion_kernel_size: 10,
            dilation_kernel_size: 10,
            max_size: 1024,
            algorithm: Algorithm::ClosedForm,
        }
    }
}

/// Result bundle of one matting request. All rasters are base64 PNG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatteResult {
    /// L8 alpha matte at original resolution
    pub alpha_matte: String,
    /// L8 trimap (0 / 128 / 255) at original resolution
    pub trimap: String,
    /// RGB input image
    pub original_image: String,
    /// RGBA foreground layer, absent when the alpha matte has no support
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    /// Wall-clock seconds, rounded to milliseconds
    pub processing_time: f64,
    /// Original (height, width)
    pub image_size: (u32, u32),
    pub algorithm: Algorithm,
    pub parameters: MattingParams,
}

/// Parameters forwarded to an automatic mask generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AutoSegmentParams {
    #[schemars(range(min = 1, max = 128))]
    pub points_per_side: u32,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub pred_iou_thresh: f32,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub stability_score_thresh: f32,
}

impl Default for AutoSegmentParams {
    fn default() -> Self {
        Self {
            points_per_side: 32,
            pred_iou_thresh: 0.8,
            stability_score_thresh: 0.95,
        }
    }
}

/// A raw mask proposal as returned by a segmentation model.
#[derive(Debug, Clone)]
pub struct MaskProposal {
    /// Binary mask, `> 127` is selected
    pub mask: GrayImage,
    pub predicted_iou: f32,
    pub stability_score: f32,
}

/// One post-processed segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub segment_id: usize,
    /// `[x_min, y_min, x_max, y_max]`, all zero for an empty mask
    pub bbox: [u32; 4],
    /// Predicted IoU rounded to 4 decimals
    pub confidence: f64,
    /// L8 mask as base64 PNG
    pub mask: String,
    /// Number of selected pixels
    pub area: u64,
    pub stability_score: f32,
    pub predicted_iou: f32,
}

/// Structured color key of the composite mask.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, JsonSchema
)]
pub struct ColorKey {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl From<[u8; 3]> for ColorKey {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

/// What a composite color stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentColor {
    pub segment_id: usize,
    pub confidence: f64,
}

/// Flattened form of a color map entry used on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColorMapEntry {
    pub color: ColorKey,
    pub segment_id: usize,
    pub confidence: f64,
}

/// Result bundle of automatic segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentationResult {
    /// Segments sorted by confidence, highest first
    pub segments: Vec<Segment>,
    pub processing_time: f64,
    /// RGB composite as base64 PNG, empty when nothing was found
    pub composite_mask: String,
    #[serde(with = "color_map_serde")]
    #[schemars(with = "Vec<ColorMapEntry>")]
    pub color_map: BTreeMap<ColorKey, SegmentColor>,
}

mod color_map_serde {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{ColorKey, ColorMapEntry, SegmentColor};

    pub fn serialize<S>(map: &BTreeMap<ColorKey, SegmentColor>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(map.iter().map(|(color, entry)| ColorMapEntry {
            color: *color,
            segment_id: entry.segment_id,
            confidence: entry.confidence,
        }))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<ColorKey, SegmentColor>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<ColorMapEntry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                (
                    entry.color,
                    SegmentColor {
                        segment_id: entry.segment_id,
                        confidence: entry.confidence,
                    },
                )
            })
            .collect())
    }
}

/// Round seconds to millisecond precision (3 decimals).
pub fn round_seconds(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse_is_case_sensitive() {
        assert_eq!(Algorithm::parse("cf").unwrap(), Algorithm::ClosedForm);
        assert_eq!(Algorithm::parse("vitmatte").unwrap(), Algorithm::VitMatte);
        assert!(matches!(Algorithm::parse("CF"), Err(MattingError::InvalidAlgorithm(_))));
        assert!(matches!(Algorithm::parse("bogus"), Err(MattingError::InvalidAlgorithm(_))));
    }

    #[test]
    fn test_algorithm_display_matches_wire_name() {
        assert_eq!(Algorithm::Lkm.to_string(), "lkm");
        assert_eq!(Algorithm::Lbdm.as_str(), "lbdm");
        let json = serde_json::to_string(&Algorithm::Knn).unwrap();
        assert_eq!(json, "\"knn\"");
        assert_eq!(Algorithm::VARIANTS, &["cf", "knn", "lbdm", "lkm", "vitmatte"]);
    }

    #[test]
    fn test_color_map_serializes_structured_keys() {
        let mut color_map = BTreeMap::new();
        color_map.insert(
            ColorKey::from([255, 0, 0]),
            SegmentColor { segment_id: 0, confidence: 0.9 },
        );
        let result = SegmentationResult {
            segments: vec![],
            processing_time: 0.0,
            composite_mask: String::new(),
            color_map,
        };

        let value = serde_json::to_value(&result).unwrap();
        let entry = &value["color_map"][0];
        assert_eq!(entry["color"]["r"], 255);
        assert_eq!(entry["segment_id"], 0);

        let parsed: SegmentationResult = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_round_seconds() {
        assert_eq!(round_seconds(1.23456), 1.235);
        assert_eq!(round_seconds(0.0004), 0.0);
    }
}

//! JSON messages exchanged with the model script.
//!
//! The script is started as `<command> --request <request.json>` and prints a
//! single [`BridgeResponse`] on stdout. Relative output paths are resolved
//! against the request's `output_dir`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Inputs `image`, `trimap`; one output alpha PNG
    Vitmatte,
    /// Input `image`; one output per mask with `predicted_iou` and `stability_score`
    AutoSegment,
    /// Inputs `image`, `mask`; one output per candidate with `score`
    PredictFromMask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub task: Task,
    /// Input name to PNG path
    pub inputs: BTreeMap<String, PathBuf>,
    pub output_dir: PathBuf,
    pub device: String,
    /// Model identifier (checkpoint, config or hub id)
    pub model: BTreeMap<String, String>,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeOutput {
    pub path: PathBuf,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub predicted_iou: Option<f32>,
    #[serde(default)]
    pub stability_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub outputs: Vec<BridgeOutput>,
}

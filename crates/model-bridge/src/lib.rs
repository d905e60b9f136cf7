//! Bridge to pretrained models living in an external Python environment.
//!
//! [`ScriptModel`] writes its inputs as PNG files into a temporary
//! directory, runs a script with a JSON request, and reads back the PNG files
//! the script reports. It implements the matting crate's model traits so the
//! pipeline can use it like any other collaborator.

pub mod error;
pub mod protocol;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{DynamicImage, GrayImage, RgbImage};
use matting::{
    AutoSegmentParams, BoxError, Device, GrayF32Image, MaskProposal, ModelScriptConfig, NeuralMattingModel,
    PromptPredictor, Sam2Variant, SegmentationModel, ServiceConfig, VitMatteVariant,
};
use serde_json::{json, Value};
use tracing::{debug, info};

pub use error::{BridgeError, Result};
pub use protocol::{BridgeOutput, BridgeRequest, BridgeResponse, Task};

/// A model script reachable through the bridge protocol.
#[derive(Debug, Clone)]
pub struct ScriptModel {
    command: Vec<OsString>,
    working_dir: Option<PathBuf>,
    device: Device,
    sam2_model: Sam2Variant,
    vitmatte_model: VitMatteVariant,
}

impl ScriptModel {
    /// Run `script` with `python`
    pub fn python<P: AsRef<Path>>(script: P) -> Self {
        Self::with_command(["python".into(), script.as_ref().as_os_str().to_owned()])
    }

    /// Run `script` with `uv run python`
    pub fn uv<P: AsRef<Path>>(script: P) -> Self {
        Self::with_command([
            "uv".into(),
            "run".into(),
            "python".into(),
            script.as_ref().as_os_str().to_owned(),
        ])
    }

    /// Run an arbitrary command line; `--request <path>` is appended to it.
    pub fn with_command<I>(command: I) -> Self
    where
        I: IntoIterator<Item = OsString>,
    {
        Self {
            command: command.into_iter().collect(),
            working_dir: None,
            device: Device::default(),
            sam2_model: Sam2Variant::default(),
            vitmatte_model: VitMatteVariant::default(),
        }
    }

    pub fn from_script_config(script: &ModelScriptConfig) -> Self {
        let model = if script.use_uv { Self::uv(&script.script) } else { Self::python(&script.script) };
        match &script.working_dir {
            Some(dir) => model.with_working_dir(dir),
            None => model,
        }
    }

    /// Build from service configuration. `None` when no script is configured.
    pub fn from_config(config: &ServiceConfig) -> Option<Self> {
        config.models.as_ref().map(|script| {
            Self::from_script_config(script)
                .with_device(config.device)
                .with_sam2_model(config.sam2_model)
                .with_vitmatte_model(config.vitmatte_model)
        })
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_sam2_model(mut self, variant: Sam2Variant) -> Self {
        self.sam2_model = variant;
        self
    }

    pub fn with_vitmatte_model(mut self, variant: VitMatteVariant) -> Self {
        self.vitmatte_model = variant;
        self
    }

    pub fn with_working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn model_fields(&self, task: Task) -> BTreeMap<String, String> {
        let mut model = BTreeMap::new();
        match task {
            Task::Vitmatte => {
                model.insert("id".to_string(), self.vitmatte_model.model_id().to_string());
            }
            Task::AutoSegment | Task::PredictFromMask => {
                model.insert("config".to_string(), self.sam2_model.config_path().to_string());
                model.insert("checkpoint".to_string(), self.sam2_model.checkpoint_path().to_string());
            }
        }
        model
    }

    /// Run one task and decode every output image it reports.
    pub fn run(&self, task: Task, inputs: &[(&str, DynamicImage)], params: Value) -> Result<Vec<(BridgeOutput, DynamicImage)>> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| BridgeError::MalformedResponse("empty model command".to_string()))?;

        // Everything exchanged with the script lives here and is removed on drop
        let workspace = tempfile::tempdir()?;
        let output_dir = workspace.path().join("outputs");
        std::fs::create_dir_all(&output_dir)?;

        let mut input_paths = BTreeMap::new();
        for (name, image) in inputs {
            let path = workspace.path().join(format!("{name}.png"));
            image.save(&path)?;
            input_paths.insert(name.to_string(), path);
        }

        let request = BridgeRequest {
            task,
            inputs: input_paths,
            output_dir: output_dir.clone(),
            device: self.device.to_string(),
            model: self.model_fields(task),
            params,
        };
        let request_path = workspace.path().join("request.json");
        std::fs::write(&request_path, serde_json::to_vec(&request)?)?;

        let mut cmd = Command::new(program);
        cmd.args(args).arg("--request").arg(&request_path);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(?task, "Running model script");
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(BridgeError::ScriptFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let response: BridgeResponse = serde_json::from_slice(&output.stdout)?;
        let outputs = response
            .outputs
            .into_iter()
            .map(|out| {
                let path = if out.path.is_relative() { output_dir.join(&out.path) } else { out.path.clone() };
                let image = image::open(&path)?;
                Ok((out, image))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(?task, outputs = outputs.len(), "Model script finished");
        Ok(outputs)
    }
}

impl NeuralMattingModel for ScriptModel {
    fn infer(&self, image: &RgbImage, trimap: &GrayImage) -> std::result::Result<GrayF32Image, BoxError> {
        let inputs = [
            ("image", DynamicImage::ImageRgb8(image.clone())),
            ("trimap", DynamicImage::ImageLuma8(trimap.clone())),
        ];
        let mut outputs = self.run(Task::Vitmatte, &inputs, Value::Null)?;
        if outputs.len() != 1 {
            return Err(BridgeError::MalformedResponse(format!("expected one alpha output, got {}", outputs.len())).into());
        }
        let (_, alpha) = outputs.remove(0);
        Ok(alpha.to_luma32f())
    }
}

impl SegmentationModel for ScriptModel {
    fn generate(&self, image: &RgbImage, params: &AutoSegmentParams) -> std::result::Result<Vec<MaskProposal>, BoxError> {
        let inputs = [("image", DynamicImage::ImageRgb8(image.clone()))];
        let params = json!({
            "points_per_side": params.points_per_side,
            "pred_iou_thresh": params.pred_iou_thresh,
            "stability_score_thresh": params.stability_score_thresh,
        });

        let outputs = self.run(Task::AutoSegment, &inputs, params)?;
        Ok(outputs
            .into_iter()
            .map(|(out, mask)| MaskProposal {
                mask: mask.to_luma8(),
                predicted_iou: out.predicted_iou.unwrap_or(0.0),
                stability_score: out.stability_score.unwrap_or(0.0),
            })
            .collect())
    }
}

impl PromptPredictor for ScriptModel {
    fn predict(&self, image: &RgbImage, mask_prompt: &GrayImage) -> std::result::Result<(Vec<GrayImage>, Vec<f32>), BoxError> {
        let inputs = [
            ("image", DynamicImage::ImageRgb8(image.clone())),
            ("mask", DynamicImage::ImageLuma8(mask_prompt.clone())),
        ];
        let outputs = self.run(Task::PredictFromMask, &inputs, Value::Null)?;
        Ok(outputs
            .into_iter()
            .map(|(out, mask)| (mask.to_luma8(), out.score.unwrap_or(0.0)))
            .unzip())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use image::Luma;

    /// A shell script that ignores its request and prints `stdout`.
    fn script(dir: &Path, body: &str) -> ScriptModel {
        let path = dir.join("model.sh");
        std::fs::write(&path, body).expect("Should write script");
        ScriptModel::with_command(["sh".into(), path.into_os_string()])
    }

    #[test]
    fn test_infer_reads_reported_alpha() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let alpha_path = dir.path().join("alpha.png");
        GrayImage::from_pixel(4, 2, Luma([255])).save(&alpha_path).expect("Should save alpha");

        let model = script(
            dir.path(),
            &format!("echo '{{\"outputs\": [{{\"path\": \"{}\"}}]}}'\n", alpha_path.display()),
        );
        let alpha = model
            .infer(&RgbImage::new(4, 2), &GrayImage::new(4, 2))
            .expect("Should run script");
        assert_eq!(alpha.dimensions(), (4, 2));
        assert!(alpha.pixels().all(|p| (p[0] - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_segmentation_scores_are_forwarded() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let mask_path = dir.path().join("mask.png");
        GrayImage::from_pixel(3, 3, Luma([255])).save(&mask_path).expect("Should save mask");

        let model = script(
            dir.path(),
            &format!(
                "echo '{{\"outputs\": [{{\"path\": \"{}\", \"predicted_iou\": 0.91, \"stability_score\": 0.97}}]}}'\n",
                mask_path.display()
            ),
        );
        let proposals = model
            .generate(&RgbImage::new(3, 3), &AutoSegmentParams::default())
            .expect("Should run script");
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].predicted_iou, 0.91);
        assert_eq!(proposals[0].stability_score, 0.97);
    }

    #[test]
    fn test_script_failure_reports_stderr() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let model = script(dir.path(), "echo 'CUDA out of memory' >&2\nexit 3\n");
        let err = model.run(Task::AutoSegment, &[], Value::Null).unwrap_err();
        match err {
            BridgeError::ScriptFailed { stderr, .. } => assert_eq!(stderr, "CUDA out of memory"),
            other => panic!("Unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_response_is_json_error() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let model = script(dir.path(), "echo 'loading weights...'\n");
        let err = model.run(Task::Vitmatte, &[], Value::Null).unwrap_err();
        assert!(matches!(err, BridgeError::Json(_)));
    }

    #[test]
    fn test_from_config_requires_script() {
        assert!(ScriptModel::from_config(&ServiceConfig::default()).is_none());
    }

    #[test]
    fn test_from_config_applies_working_dir() {
        let config = ServiceConfig {
            models: Some(ModelScriptConfig {
                script: PathBuf::from("bridge.py"),
                use_uv: true,
                working_dir: Some(PathBuf::from("/opt/models")),
            }),
            ..ServiceConfig::default()
        };
        let model = ScriptModel::from_config(&config).expect("Should build from script config");
        assert_eq!(model.working_dir, Some(PathBuf::from("/opt/models")));
    }
}

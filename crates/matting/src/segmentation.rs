//! Post-processing of segmentation model output into segments, a colored
//! composite and a color legend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use image::{GrayImage, Luma, Rgb, RgbImage};
use tracing::{debug, info, instrument};

use crate::{
    encode::{encode_gray, encode_rgb},
    error::{MattingError, Result},
    raster::ensure_same_size,
    resize::Dimensions,
    traits::{PromptPredictor, SegmentationModel},
    trimap::MASK_THRESHOLD,
    types::{round_seconds, AutoSegmentParams, ColorKey, MaskProposal, Segment, SegmentColor, SegmentationResult},
};

/// HLS to RGB conversion, all components in [0, 1].
pub fn hls_to_rgb(h: f64, l: f64, s: f64) -> [f64; 3] {
    if s == 0.0 {
        return [l, l, l];
    }
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;

    let channel = |hue: f64| -> f64 {
        let hue = hue.rem_euclid(1.0);
        if hue < 1.0 / 6.0 {
            m1 + (m2 - m1) * hue * 6.0
        } else if hue < 0.5 {
            m2
        } else if hue < 2.0 / 3.0 {
            m1 + (m2 - m1) * (2.0 / 3.0 - hue) * 6.0
        } else {
            m1
        }
    };

    [channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0)]
}

/// `count` evenly spaced, fully saturated hues. Channels are truncated.
pub fn segment_colors(count: usize) -> Vec<[u8; 3]> {
    (0..count)
        .map(|i| {
            let [r, g, b] = hls_to_rgb(i as f64 / count as f64, 0.5, 1.0);
            [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Bounding box `[x_min, y_min, x_max, y_max]` and selected pixel count.
pub fn mask_extent(mask: &GrayImage) -> ([u32; 4], u64) {
    let mut bbox: Option<[u32; 4]> = None;
    let mut area = 0u64;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] <= MASK_THRESHOLD {
            continue;
        }
        area += 1;
        bbox = Some(match bbox {
            None => [x, y, x, y],
            Some([x0, y0, x1, y1]) => [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
        });
    }
    (bbox.unwrap_or([0; 4]), area)
}

fn describe(mask: &GrayImage, segment_id: usize, predicted_iou: f32, stability_score: f32) -> Result<Segment> {
    let (bbox, area) = mask_extent(mask);
    let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if mask.get_pixel(x, y)[0] > MASK_THRESHOLD { 255 } else { 0 }])
    });

    Ok(Segment {
        segment_id,
        bbox,
        confidence: round4(f64::from(predicted_iou)),
        mask: encode_gray(&binary, "segment mask")?,
        area,
        stability_score,
        predicted_iou,
    })
}

/// Turn raw mask proposals into a [`SegmentationResult`].
///
/// Later proposals paint over earlier ones in the composite. Segments are
/// sorted by confidence, highest first.
pub fn post_process(image_size: Dimensions, proposals: &[MaskProposal], started: Instant) -> Result<SegmentationResult> {
    if proposals.is_empty() {
        return Ok(SegmentationResult {
            segments: Vec::new(),
            processing_time: round_seconds(started.elapsed().as_secs_f64()),
            composite_mask: String::new(),
            color_map: BTreeMap::new(),
        });
    }

    let colors = segment_colors(proposals.len());
    let mut composite = RgbImage::new(image_size.width, image_size.height);
    let mut color_map = BTreeMap::new();
    let mut segments = Vec::with_capacity(proposals.len());

    for (segment_id, (proposal, color)) in proposals.iter().zip(colors).enumerate() {
        ensure_same_size("segment mask", image_size, Dimensions::of(&proposal.mask))?;

        let segment = describe(&proposal.mask, segment_id, proposal.predicted_iou, proposal.stability_score)?;
        for (x, y, pixel) in proposal.mask.enumerate_pixels() {
            if pixel[0] > MASK_THRESHOLD {
                composite.put_pixel(x, y, Rgb(color));
            }
        }
        color_map.insert(
            ColorKey::from(color),
            SegmentColor {
                segment_id,
                confidence: segment.confidence,
            },
        );
        segments.push(segment);
    }

    segments.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    Ok(SegmentationResult {
        segments,
        processing_time: round_seconds(started.elapsed().as_secs_f64()),
        composite_mask: encode_rgb(&composite, "composite mask")?,
        color_map,
    })
}

/// Segmentation front end over injected model handles.
#[derive(Clone, Default)]
pub struct Segmenter {
    model: Option<Arc<dyn SegmentationModel>>,
    predictor: Option<Arc<dyn PromptPredictor>>,
}

impl Segmenter {
    pub fn new(model: Option<Arc<dyn SegmentationModel>>, predictor: Option<Arc<dyn PromptPredictor>>) -> Self {
        Self { model, predictor }
    }

    pub fn with_model(mut self, model: Arc<dyn SegmentationModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn PromptPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Segment everything in `image`.
    #[instrument(skip_all, fields(points_per_side = params.points_per_side))]
    pub fn auto_segment(&self, image: &RgbImage, params: &AutoSegmentParams) -> Result<SegmentationResult> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| MattingError::ModelUnavailable("segmentation model".to_string()))?;

        let started = Instant::now();
        let proposals = model
            .generate(image, params)
            .map_err(|source| MattingError::failure("segmentation", source))?;
        debug!(proposals = proposals.len(), "Segmentation model returned");

        let result = post_process(Dimensions::of(image), &proposals, started)?;
        info!("Found {} segments in {:.3}s", result.segments.len(), result.processing_time);
        Ok(result)
    }

    /// Refine a rough mask prompt into the predictor's best scoring mask.
    #[instrument(skip_all)]
    pub fn segment_from_prompt(&self, image: &RgbImage, mask_prompt: &GrayImage) -> Result<Segment> {
        let predictor = self
            .predictor
            .as_ref()
            .ok_or_else(|| MattingError::ModelUnavailable("prompt predictor".to_string()))?;

        let (masks, scores) = predictor
            .predict(image, mask_prompt)
            .map_err(|source| MattingError::failure("prompt prediction", source))?;

        let (best, score) = masks
            .iter()
            .zip(scores.iter().copied())
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| MattingError::failure("prompt prediction", "predictor returned no masks"))?;
        ensure_same_size("predicted mask", Dimensions::of(image), Dimensions::of(best))?;

        describe(best, 0, score, 0.0)
    }
}

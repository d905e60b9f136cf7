use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    encode::decode_base64,
    error::Result,
    types::{MatteResult, SegmentationResult},
};

/// Files written by [`MatteResult::write_rasters`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPaths {
    pub alpha_matte: PathBuf,
    pub trimap: PathBuf,
    pub original_image: PathBuf,
    pub foreground: Option<PathBuf>,
}

/// Payloads are already PNG, so the decoded bytes go to disk unchanged.
fn write_png(dir: &Path, stem: &str, suffix: &str, payload: &str) -> Result<PathBuf> {
    let path = dir.join(format!("{stem}_{suffix}.png"));
    std::fs::write(&path, decode_base64(payload)?)?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

impl MatteResult {
    /// Write every raster of the bundle as `<stem>_<raster>.png` under `dir`.
    pub fn write_rasters<P: AsRef<Path>>(&self, dir: P, stem: &str) -> Result<RasterPaths> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        Ok(RasterPaths {
            alpha_matte: write_png(dir, stem, "alpha", &self.alpha_matte)?,
            trimap: write_png(dir, stem, "trimap", &self.trimap)?,
            original_image: write_png(dir, stem, "original", &self.original_image)?,
            foreground: self
                .foreground
                .as_deref()
                .map(|payload| write_png(dir, stem, "foreground", payload))
                .transpose()?,
        })
    }
}

impl SegmentationResult {
    /// Write the composite and every segment mask under `dir`. Returns the
    /// composite path, or `None` when nothing was segmented.
    pub fn write_rasters<P: AsRef<Path>>(&self, dir: P, stem: &str) -> Result<Option<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        for segment in &self.segments {
            write_png(dir, stem, &format!("segment_{}", segment.segment_id), &segment.mask)?;
        }
        if self.composite_mask.is_empty() {
            return Ok(None);
        }
        write_png(dir, stem, "composite", &self.composite_mask).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_gray, encode_rgb};
    use crate::types::{Algorithm, MattingParams};
    use image::{GrayImage, RgbImage};

    fn bundle() -> MatteResult {
        let gray = encode_gray(&GrayImage::new(4, 3), "alpha").expect("Should encode");
        MatteResult {
            alpha_matte: gray.clone(),
            trimap: gray,
            original_image: encode_rgb(&RgbImage::new(4, 3), "original").expect("Should encode"),
            foreground: None,
            processing_time: 0.012,
            image_size: (3, 4),
            algorithm: Algorithm::ClosedForm,
            parameters: MattingParams::default(),
        }
    }

    #[test]
    fn test_write_rasters_names_files_by_stem() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let paths = bundle().write_rasters(dir.path(), "cat").expect("Should write rasters");

        assert_eq!(paths.alpha_matte, dir.path().join("cat_alpha.png"));
        assert!(paths.foreground.is_none());
        let alpha = image::open(&paths.alpha_matte).expect("Should open alpha");
        assert_eq!((alpha.width(), alpha.height()), (4, 3));
        assert!(paths.original_image.exists());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("result.json");
        let result = bundle();
        result.save_json(&path).expect("Should save");
        assert_eq!(MatteResult::load_json(&path).expect("Should load"), result);
    }
}

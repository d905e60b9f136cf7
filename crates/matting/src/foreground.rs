use image::Rgb32FImage;
use tracing::{debug, instrument};

use crate::{
    error::{MattingError, Result},
    raster::ensure_same_size,
    resize::Dimensions,
    traits::ForegroundSolver,
    types::GrayF32Image,
};

/// Label used for foreground solver failures.
pub const FOREGROUND_STAGE: &str = "foreground";

/// Whether the alpha matte selects anything at all.
pub fn has_support(alpha: &GrayF32Image) -> bool {
    alpha.pixels().any(|p| p[0] > 0.0)
}

/// Recover the unblended foreground colors behind `alpha`.
#[instrument(skip_all)]
pub fn estimate_foreground(solver: &dyn ForegroundSolver, image: &Rgb32FImage, alpha: &GrayF32Image) -> Result<Rgb32FImage> {
    ensure_same_size("foreground estimation", Dimensions::of(image), Dimensions::of(alpha))?;

    let foreground = solver
        .solve(image, alpha)
        .map_err(|source| MattingError::failure(FOREGROUND_STAGE, source))?;
    ensure_same_size("foreground solver output", Dimensions::of(alpha), Dimensions::of(&foreground))?;

    debug!(width = foreground.width(), height = foreground.height(), "Recovered foreground");
    Ok(foreground)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use image::{Luma, Rgb};

    struct ImageEcho;

    impl ForegroundSolver for ImageEcho {
        fn solve(&self, image: &Rgb32FImage, _alpha: &GrayF32Image) -> std::result::Result<Rgb32FImage, BoxError> {
            Ok(image.clone())
        }
    }

    struct Broken;

    impl ForegroundSolver for Broken {
        fn solve(&self, _image: &Rgb32FImage, _alpha: &GrayF32Image) -> std::result::Result<Rgb32FImage, BoxError> {
            Err("did not converge".into())
        }
    }

    #[test]
    fn test_foreground_passes_through_solver() {
        let image = Rgb32FImage::from_pixel(4, 4, Rgb([0.1, 0.2, 0.3]));
        let alpha = GrayF32Image::from_pixel(4, 4, Luma([1.0]));
        let fg = estimate_foreground(&ImageEcho, &image, &alpha).expect("Should recover foreground");
        assert_eq!(fg, image);
    }

    #[test]
    fn test_foreground_failure_keeps_cause() {
        let image = Rgb32FImage::new(2, 2);
        let alpha = GrayF32Image::new(2, 2);
        let err = estimate_foreground(&Broken, &image, &alpha).unwrap_err();
        assert!(matches!(err, MattingError::MattingFailure { ref algorithm, .. } if algorithm == FOREGROUND_STAGE));
    }

    #[test]
    fn test_support_detection() {
        assert!(!has_support(&GrayF32Image::new(3, 3)));
        assert!(has_support(&GrayF32Image::from_pixel(3, 3, Luma([0.01]))));
    }
}

//! Saving result bundles to disk.

mod json;
mod rasters;

pub use rasters::RasterPaths;

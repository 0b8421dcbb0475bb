pub mod enhance;
pub mod grid;
pub mod lines;
pub mod morphology;
pub mod regions;

use std::path::Path;

use image::GrayImage;

use crate::core::error::PipelineError;

/// Decodes any supported raster format into the grayscale buffer every
/// detector works on.
pub fn load_grayscale(path: &Path) -> Result<GrayImage, PipelineError> {
    let image = image::open(path).map_err(|err| PipelineError::decode(path, err))?;
    Ok(image.to_luma8())
}

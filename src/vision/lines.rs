use image::GrayImage;
use tracing::debug;

use crate::vision::morphology::{adaptive_threshold_gaussian_inv, close_rect, open_rect, union};

/// Binary masks isolating long ruled lines. Both masks have the input's shape.
#[derive(Debug, Clone)]
pub struct LineMasks {
    pub horizontal: GrayImage,
    pub vertical: GrayImage,
}

impl LineMasks {
    pub fn combined(&self) -> GrayImage {
        union(&self.horizontal, &self.vertical)
    }

    pub fn is_empty(&self) -> bool {
        self.horizontal.width() == 0 || self.horizontal.height() == 0
    }
}

/// Extracts horizontal and vertical rule masks through directional opening.
///
/// The structuring element length is a fixed fraction of the image side, so
/// the same detector works across scan resolutions.
#[derive(Debug, Clone)]
pub struct GridLineDetector {
    pub block_size: u32,
    pub offset: i16,
    /// Kernel length is `side / scale`.
    pub scale: u32,
}

impl Default for GridLineDetector {
    fn default() -> Self {
        Self {
            block_size: 11,
            offset: 2,
            scale: 30,
        }
    }
}

impl GridLineDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inverted binary image with speckle removed.
    pub fn binarize(&self, gray: &GrayImage) -> GrayImage {
        let binary = adaptive_threshold_gaussian_inv(gray, self.block_size, self.offset);
        close_rect(&binary, 2, 2)
    }

    pub fn detect(&self, gray: &GrayImage) -> LineMasks {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return LineMasks {
                horizontal: GrayImage::new(width, height),
                vertical: GrayImage::new(width, height),
            };
        }

        let binary = self.binarize(gray);
        let scale = self.scale.max(1);
        let horizontal_len = (width / scale).max(1);
        let vertical_len = (height / scale).max(1);
        debug!(width, height, horizontal_len, vertical_len, "detecting ruled lines");

        LineMasks {
            horizontal: open_rect(&binary, horizontal_len, 1),
            vertical: open_rect(&binary, 1, vertical_len),
        }
    }
}

use image::imageops::crop_imm;
use image::GrayImage;
use tracing::debug;

use crate::core::error::PipelineError;
use crate::core::model::{Cell, TableGrid, TableRegion};
use crate::vision::lines::GridLineDetector;

/// Recovers row and column boundaries inside one table region from
/// projection profiles of its own line masks.
#[derive(Debug, Clone)]
pub struct TableGridExtractor {
    pub detector: GridLineDetector,
    /// Fraction of the strongest projection a line must exceed.
    pub peak_ratio: f32,
    /// Minimum distance between two accepted boundaries.
    pub min_gap: u32,
}

impl Default for TableGridExtractor {
    fn default() -> Self {
        Self {
            detector: GridLineDetector::default(),
            peak_ratio: 0.5,
            min_gap: 10,
        }
    }
}

impl TableGridExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract(&self, gray: &GrayImage, region: &TableRegion) -> Result<TableGrid, PipelineError> {
        let (page_w, page_h) = gray.dimensions();
        let x = region.x.min(page_w);
        let y = region.y.min(page_h);
        let width = region.width.min(page_w - x);
        let height = region.height.min(page_h - y);
        if width == 0 || height == 0 {
            return Err(PipelineError::GridTooSmall { rows: 0, columns: 0 });
        }

        let crop = crop_imm(gray, x, y, width, height).to_image();
        let masks = self.detector.detect(&crop);

        let row_profile = projection(&masks.horizontal, Axis::Rows);
        let column_profile = projection(&masks.vertical, Axis::Columns);
        let row_boundaries = self.peaks(&row_profile);
        let column_boundaries = self.peaks(&column_profile);

        if row_boundaries.len() < 2 || column_boundaries.len() < 2 {
            return Err(PipelineError::GridTooSmall {
                rows: row_boundaries.len(),
                columns: column_boundaries.len(),
            });
        }

        let cells = cells_from_boundaries(&row_boundaries, &column_boundaries, (x, y));
        debug!(
            rows = row_boundaries.len(),
            columns = column_boundaries.len(),
            cells = cells.len(),
            "extracted table grid"
        );

        Ok(TableGrid {
            row_boundaries,
            column_boundaries,
            cells,
        })
    }

    /// 1-D non-maximum suppression: indices above `peak_ratio * max`, each at
    /// least `min_gap` after the previously accepted one.
    pub fn peaks(&self, profile: &[u64]) -> Vec<u32> {
        let max = profile.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return Vec::new();
        }
        let threshold = max as f64 * self.peak_ratio as f64;

        let mut accepted: Vec<u32> = Vec::new();
        for (index, &value) in profile.iter().enumerate() {
            if (value as f64) <= threshold {
                continue;
            }
            let index = index as u32;
            match accepted.last() {
                Some(&last) if index - last < self.min_gap => {}
                _ => accepted.push(index),
            }
        }
        accepted
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Rows,
    Columns,
}

fn projection(mask: &GrayImage, axis: Axis) -> Vec<u64> {
    let (width, height) = mask.dimensions();
    let len = match axis {
        Axis::Rows => height,
        Axis::Columns => width,
    };
    let mut profile = vec![0u64; len as usize];
    for (x, y, pixel) in mask.enumerate_pixels() {
        let slot = match axis {
            Axis::Rows => y,
            Axis::Columns => x,
        };
        profile[slot as usize] += pixel[0] as u64;
    }
    profile
}

/// Cartesian product of adjacent boundary pairs, shifted into page space.
pub fn cells_from_boundaries(rows: &[u32], columns: &[u32], offset: (u32, u32)) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(rows.len().saturating_sub(1) * columns.len().saturating_sub(1));
    for (row_index, pair) in rows.windows(2).enumerate() {
        for (col_index, col_pair) in columns.windows(2).enumerate() {
            cells.push(Cell {
                row_index,
                col_index,
                x: offset.0 + col_pair[0],
                y: offset.1 + pair[0],
                width: col_pair[1] - col_pair[0],
                height: pair[1] - pair[0],
            });
        }
    }
    cells
}

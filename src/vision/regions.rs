use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use tracing::{debug, info};

use crate::core::geometry::{polygon_area, Point};
use crate::core::model::TableRegion;
use crate::vision::lines::{GridLineDetector, LineMasks};

/// Turns ruled-line masks into table candidates in reading order.
#[derive(Debug, Clone)]
pub struct TableRegionFinder {
    pub detector: GridLineDetector,
    pub min_area: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl Default for TableRegionFinder {
    fn default() -> Self {
        Self {
            detector: GridLineDetector::default(),
            min_area: 10_000.0,
            min_aspect: 0.3,
            max_aspect: 5.0,
        }
    }
}

impl TableRegionFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_in_image(&self, gray: &GrayImage) -> Vec<TableRegion> {
        let masks = self.detector.detect(gray);
        self.find(&masks)
    }

    pub fn find(&self, masks: &LineMasks) -> Vec<TableRegion> {
        if masks.is_empty() {
            return Vec::new();
        }

        let table_mask = masks.combined();
        let contours: Vec<Contour<u32>> = find_contours(&table_mask);

        let mut regions: Vec<TableRegion> = contours
            .iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter_map(|contour| self.region_from_contour(contour))
            .collect();

        regions.sort_by_key(|region| (region.y, region.x));
        info!(count = regions.len(), "table regions detected");
        regions
    }

    fn region_from_contour(&self, contour: &Contour<u32>) -> Option<TableRegion> {
        if contour.points.len() < 3 {
            return None;
        }

        let points: Vec<Point> = contour
            .points
            .iter()
            .map(|p| Point::new(p.x as f32, p.y as f32))
            .collect();
        let area = polygon_area(&points);
        if area <= self.min_area {
            return None;
        }

        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        for p in &contour.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let width = max_x - min_x + 1;
        let height = max_y - min_y + 1;
        let aspect_ratio = width as f32 / height as f32;

        if aspect_ratio <= self.min_aspect || aspect_ratio >= self.max_aspect {
            debug!(width, height, aspect_ratio, "rejecting region by aspect ratio");
            return None;
        }

        Some(TableRegion {
            x: min_x,
            y: min_y,
            width,
            height,
            area,
            aspect_ratio,
        })
    }
}

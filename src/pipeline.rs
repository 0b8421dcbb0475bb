use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::table::{GridTableStrategy, TextTableDetector};
use crate::classify::{ContentClassifier, DetectionConfig, TableStrategy};
use crate::core::error::PipelineError;
use crate::core::model::{DocumentMetadata, DocumentResult, TableGrid, TableRegion};
use crate::export::{export_all, DocumentReconstructor, ExportFormat};
use crate::ocr::bridge::TesseractBridge;
use crate::ocr::{OcrEngine, OcrLine, OcrOutput, OcrRequest};
use crate::text::corrector::{CorrectorConfig, OcrTextCorrector};
use crate::vision::enhance::{EnhanceConfig, ImageEnhancer};
use crate::vision::grid::TableGridExtractor;
use crate::vision::load_grayscale;
use crate::vision::regions::TableRegionFinder;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    pub language: String,
    pub binary: PathBuf,
    pub timeout_secs: u64,
    /// Tesseract page segmentation mode.
    pub psm: Option<u8>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "tur+eng".to_string(),
            binary: PathBuf::from("tesseract"),
            timeout_secs: 120,
            psm: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub detection: DetectionConfig,
    pub ocr: OcrConfig,
    pub corrector: CorrectorConfig,
    pub enhance: EnhanceConfig,
    /// Documents processed concurrently by `process_batch`.
    pub workers: usize,
    /// Where enhanced intermediate images are written.
    pub work_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            ocr: OcrConfig::default(),
            corrector: CorrectorConfig::default(),
            enhance: EnhanceConfig::default(),
            workers: 4,
            work_dir: std::env::temp_dir().join("scanstruct"),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|err| PipelineError::Config(format!("{}: {err}", path.display())))?;
        if config.workers == 0 {
            return Err(PipelineError::Config("workers must be at least 1".to_string()).into());
        }
        Ok(config)
    }

    pub fn tesseract(&self) -> TesseractBridge {
        TesseractBridge::new(&self.ocr.binary)
            .with_timeout(Duration::from_secs(self.ocr.timeout_secs))
            .with_psm(self.ocr.psm)
    }
}

/// One detected region and its grid, if the grid had enough boundaries.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub region: TableRegion,
    pub grid: Option<TableGrid>,
}

/// Geometry-only pass: regions and grids, no OCR.
pub fn inspect_tables(input: &Path) -> Result<Vec<TableReport>, PipelineError> {
    let gray = load_grayscale(input)?;
    let regions = TableRegionFinder::new().find_in_image(&gray);
    if regions.is_empty() {
        return Err(PipelineError::NoRegionFound);
    }

    let extractor = TableGridExtractor::new();
    Ok(regions
        .into_iter()
        .map(|region| TableReport {
            grid: extractor.extract(&gray, &region).ok(),
            region,
        })
        .collect())
}

fn extract_grids(gray: &GrayImage, regions: &[TableRegion]) -> Vec<(TableRegion, TableGrid)> {
    let extractor = TableGridExtractor::new();
    regions
        .iter()
        .filter_map(|region| match extractor.extract(gray, region) {
            Ok(grid) => Some((*region, grid)),
            Err(err) => {
                debug!(error = %err, "treating table region as gridless");
                None
            }
        })
        .collect()
}

/// Rebuilds the OCR text from lines whose centers lie outside every table.
fn text_outside_tables(lines: &[OcrLine], tables: &[TableRegion]) -> String {
    let mut text = String::new();
    let mut first = true;
    for line in lines {
        if tables.iter().any(|region| region.bbox().contains_center_of(&line.bbox)) {
            continue;
        }
        if !first {
            text.push_str(if line.starts_paragraph { "\n\n" } else { "\n" });
        }
        text.push_str(&line.text);
        first = false;
    }
    text
}

fn run_ocr(engine: &dyn OcrEngine, image: &Path, request: &OcrRequest, warnings: &mut Vec<String>) -> Result<OcrOutput> {
    match engine.recognize(image, request) {
        Ok(output) if output.success => Ok(output),
        Ok(output) => {
            let reason = output.error.clone().unwrap_or_else(|| "unknown error".to_string());
            warn!(%reason, "OCR failed, continuing with partial text");
            warnings.push(format!("OCR failed: {reason}"));
            Ok(output)
        }
        Err(err) if err.is_recoverable() => {
            warn!(error = %err, "OCR unavailable, continuing without text");
            warnings.push(err.to_string());
            Ok(OcrOutput::failed(err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn process_image(input: &Path, config: &PipelineConfig, engine: &dyn OcrEngine) -> Result<DocumentResult> {
    info!(input = %input.display(), "processing image");
    let mut warnings = Vec::new();

    let gray = match load_grayscale(input) {
        Ok(gray) => Some(gray),
        Err(err) => {
            warn!(error = %err, "image unreadable, skipping layout analysis");
            warnings.push(err.to_string());
            None
        }
    };

    let finder = TableRegionFinder::new();
    let mut regions = gray
        .as_ref()
        .map(|gray| finder.find_in_image(gray))
        .unwrap_or_default();
    let has_tables = !regions.is_empty();
    info!(regions = regions.len(), "layout analysis complete");

    let enhanced = match (has_tables, config.detection.detect_tables, gray.as_ref()) {
        (true, true, Some(page)) => {
            Some(ImageEnhancer::new(config.enhance.clone()).enhance_file(page, input, &config.work_dir))
        }
        _ => None,
    };

    // OCR word boxes live in the coordinates of the image it reads, so table
    // geometry is taken from the same page.
    let mut layout = gray;
    let mut image_for_ocr = input.to_path_buf();
    let mut deskew_angle = None;
    let mut enhanced_image = None;
    if let Some(enhanced) = enhanced {
        if enhanced.deskew_angle.is_some() {
            regions = finder.find_in_image(&enhanced.layout);
            debug!(regions = regions.len(), "regions found again on deskewed page");
        }
        if enhanced.written {
            enhanced_image = Some(enhanced.path.clone());
        }
        image_for_ocr = enhanced.path;
        deskew_angle = enhanced.deskew_angle;
        layout = Some(enhanced.layout);
    }

    let request = OcrRequest::new(config.ocr.language.clone()).with_layout(has_tables);
    let ocr = run_ocr(engine, &image_for_ocr, &request, &mut warnings)?;
    info!(confidence = ocr.confidence, "OCR confidence");

    let grids = match (&layout, config.detection.detect_tables) {
        (Some(page), true) => extract_grids(page, &regions),
        _ => Vec::new(),
    };
    let has_words = ocr.lines.iter().any(|line| !line.words.is_empty());

    let corrector = OcrTextCorrector::new(config.corrector.clone());
    let classifier = ContentClassifier::new(config.detection.clone());
    let grid_regions: Vec<TableRegion> = grids.iter().map(|(region, _)| *region).collect();
    let grid_list: Vec<TableGrid> = grids.into_iter().map(|(_, grid)| grid).collect();

    let use_grids = !grid_list.is_empty() && has_words;
    let stream = if use_grids {
        text_outside_tables(&ocr.lines, &grid_regions)
    } else {
        ocr.text.clone()
    };
    let strategy: Box<dyn TableStrategy + '_> = if use_grids {
        Box::new(GridTableStrategy::new(&grid_list, &ocr.lines, &corrector))
    } else {
        Box::new(TextTableDetector::new())
    };

    let cleaned_text = corrector.correct(&stream);
    let classified = classifier.classify(&cleaned_text, strategy.as_ref());
    let reconstruction = DocumentReconstructor::new().reconstruct(&cleaned_text, &classified);

    let metadata = DocumentMetadata {
        ocr_confidence: ocr.success.then_some(ocr.confidence),
        word_count: reconstruction.markdown.split_whitespace().count(),
        character_count: reconstruction.markdown.chars().count(),
        table_regions: regions.len(),
        deskew_angle,
        enhanced_image,
    };

    Ok(DocumentResult {
        source: input.to_path_buf(),
        markdown: reconstruction.markdown,
        cleaned_text,
        blocks: reconstruction.blocks,
        regions,
        metadata,
        warnings,
    })
}

/// Processes independent images on a bounded pool. Results come back in
/// input order regardless of completion order.
pub fn process_batch(
    inputs: &[PathBuf],
    config: &PipelineConfig,
    engine: &dyn OcrEngine,
) -> Result<Vec<(PathBuf, Result<DocumentResult>)>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build()
        .context("failed to build worker pool")?;

    Ok(pool.install(|| {
        inputs
            .par_iter()
            .map(|input| (input.clone(), process_image(input, config, engine)))
            .collect()
    }))
}

/// Export directory for each batch input under `base`. Inputs that share a
/// file stem get their 1-based position appended so their outputs stay apart.
pub fn batch_output_dirs(base: &Path, inputs: &[PathBuf]) -> Vec<PathBuf> {
    let stems: Vec<String> = inputs
        .iter()
        .map(|input| {
            input
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string())
        })
        .collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for stem in &stems {
        *counts.entry(stem.as_str()).or_default() += 1;
    }

    let mut taken: HashSet<String> = stems
        .iter()
        .filter(|stem| counts[stem.as_str()] == 1)
        .cloned()
        .collect();
    stems
        .iter()
        .enumerate()
        .map(|(index, stem)| {
            if counts[stem.as_str()] == 1 {
                return base.join(stem);
            }
            let mut name = format!("{stem}_{}", index + 1);
            while !taken.insert(name.clone()) {
                name.push_str(&format!("_{}", index + 1));
            }
            base.join(name)
        })
        .collect()
}

pub fn export_document(document: &DocumentResult, formats: &[ExportFormat], output: &Path) -> Result<Vec<PathBuf>> {
    export_all(document, formats, output)
}

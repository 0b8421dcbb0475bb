use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::rect::Rect;
use pretty_assertions::assert_eq;

use scanstruct::core::error::PipelineError;
use scanstruct::core::geometry::BBox;
use scanstruct::core::model::{ContentBlock, TableSource};
use scanstruct::export::{export_all, ExportFormat};
use scanstruct::ocr::{OcrEngine, OcrLine, OcrOutput, OcrRequest, OcrWord};
use scanstruct::pipeline::{inspect_tables, process_batch, process_image, PipelineConfig};

/// Replays a fixed recognition result and remembers what it was asked for.
struct FakeOcr {
    output: OcrOutput,
    layout_requests: Mutex<Vec<bool>>,
}

impl FakeOcr {
    fn new(output: OcrOutput) -> Self {
        Self {
            output,
            layout_requests: Mutex::new(Vec::new()),
        }
    }
}

impl OcrEngine for FakeOcr {
    fn recognize(&self, _image: &Path, request: &OcrRequest) -> Result<OcrOutput, PipelineError> {
        if let Ok(mut requests) = self.layout_requests.lock() {
            requests.push(request.preserve_layout);
        }
        Ok(self.output.clone())
    }
}

fn temp_output_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!("scanstruct_{label}_{nanos}"));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        work_dir: dir.join("work"),
        workers: 2,
        ..PipelineConfig::default()
    }
}

/// 3x2 ruled table at (80, 120) with 100x40 cells on a white 600x500 page.
fn ruled_page() -> GrayImage {
    draw_ruled_table((600, 500), (80, 120), (100, 40), 3, 2, 2)
}

fn draw_ruled_table(
    page: (u32, u32),
    origin: (i32, i32),
    cell: (u32, u32),
    rows: u32,
    cols: u32,
    thickness: u32,
) -> GrayImage {
    let mut gray = GrayImage::from_pixel(page.0, page.1, Luma([255]));
    let (x0, y0) = origin;
    let (cell_w, cell_h) = cell;
    for r in 0..=rows {
        let y = y0 + (r * cell_h) as i32;
        draw_filled_rect_mut(
            &mut gray,
            Rect::at(x0, y).of_size(cell_w * cols + thickness, thickness),
            Luma([0]),
        );
    }
    for c in 0..=cols {
        let x = x0 + (c * cell_w) as i32;
        draw_filled_rect_mut(
            &mut gray,
            Rect::at(x, y0).of_size(thickness, cell_h * rows + thickness),
            Luma([0]),
        );
    }
    gray
}

fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> OcrWord {
    OcrWord {
        text: text.to_string(),
        bbox: BBox::new(x0, y0, x1, y1),
        confidence: 90.0,
    }
}

fn line(words: Vec<OcrWord>, starts_paragraph: bool) -> OcrLine {
    let bbox = words
        .iter()
        .map(|w| w.bbox)
        .reduce(|a, b| a.union(&b))
        .unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0));
    let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
    OcrLine {
        text,
        bbox,
        words,
        starts_paragraph,
    }
}

fn ruled_page_ocr() -> OcrOutput {
    let lines = vec![
        line(
            vec![
                word("Summary", 80.0, 40.0, 160.0, 60.0),
                word("of", 165.0, 40.0, 180.0, 60.0),
                word("results", 185.0, 40.0, 250.0, 60.0),
            ],
            true,
        ),
        line(
            vec![word("Name", 95.0, 128.0, 140.0, 150.0), word("Age", 195.0, 128.0, 230.0, 150.0)],
            true,
        ),
        line(
            vec![word("Alice", 95.0, 168.0, 150.0, 190.0), word("28", 195.0, 168.0, 215.0, 190.0)],
            false,
        ),
        line(
            vec![word("Bob", 95.0, 208.0, 135.0, 230.0), word("34", 195.0, 208.0, 215.0, 230.0)],
            false,
        ),
        line(
            vec![
                word("All", 80.0, 300.0, 110.0, 320.0),
                word("values", 115.0, 300.0, 170.0, 320.0),
                word("are", 175.0, 300.0, 200.0, 320.0),
                word("final.", 205.0, 300.0, 250.0, 320.0),
            ],
            true,
        ),
    ];
    let text = lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n");
    OcrOutput {
        success: true,
        text,
        confidence: 88.5,
        error: None,
        lines,
    }
}

#[test]
fn ruled_table_is_filled_from_ocr_words() -> Result<()> {
    let dir = temp_output_dir("ruled");
    let input = dir.join("report.png");
    ruled_page().save(&input)?;

    let engine = FakeOcr::new(ruled_page_ocr());
    let document = process_image(&input, &config_in(&dir), &engine)?;

    assert_eq!(document.regions.len(), 1);
    assert_eq!(document.metadata.table_regions, 1);
    assert_eq!(document.metadata.ocr_confidence, Some(88.5));
    assert_eq!(*engine.layout_requests.lock().expect("lock"), vec![true]);
    let enhanced = document.metadata.enhanced_image.as_ref().expect("enhanced image written");
    assert!(enhanced.starts_with(dir.join("work")));
    assert!(enhanced.exists());

    assert_eq!(document.cleaned_text, "Summary of results\n\nAll values are final.");

    let tables: Vec<_> = document.tables().collect();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].source, TableSource::ImageGrid);
    assert_eq!(
        tables[0].rows,
        vec![vec!["Name", "Age"], vec!["Alice", "28"], vec!["Bob", "34"]]
    );

    assert!(document.markdown.starts_with("Summary of results\n"));
    let table_at = document.markdown.find("| Name | Age |").expect("table rendered");
    let text_at = document.markdown.find("All values are final.").expect("text rendered");
    assert!(text_at < table_at);
    assert!(matches!(document.blocks.last(), Some(ContentBlock::Table(_))));
    assert!(document.warnings.is_empty());

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

/// Reports which image it was given by its width, and puts one word in the
/// middle of every cell of an upright grid when configured with one.
struct GeometryOcr {
    grid: Option<((f32, f32), (f32, f32), usize, usize)>,
}

impl OcrEngine for GeometryOcr {
    fn recognize(&self, image: &Path, _request: &OcrRequest) -> Result<OcrOutput, PipelineError> {
        let (width, _) = image::image_dimensions(image).map_err(|err| PipelineError::decode(image, err))?;
        let mut lines = Vec::new();
        if let Some(((x0, y0), (cell_w, cell_h), rows, cols)) = self.grid {
            for r in 0..rows {
                let words = (0..cols)
                    .map(|c| {
                        let cx = x0 + (c as f32 + 0.5) * cell_w;
                        let cy = y0 + (r as f32 + 0.5) * cell_h;
                        word(&format!("r{r}c{c}"), cx - 30.0, cy - 10.0, cx + 30.0, cy + 10.0)
                    })
                    .collect();
                lines.push(line(words, r == 0));
            }
        }
        Ok(OcrOutput {
            success: true,
            text: format!("W{width}"),
            confidence: 90.0,
            error: None,
            lines,
        })
    }
}

#[test]
fn same_stem_inputs_keep_their_own_images() -> Result<()> {
    let dir = temp_output_dir("samestem");
    let first = dir.join("a").join("page.png");
    let second = dir.join("b").join("page.png");
    fs::create_dir_all(dir.join("a"))?;
    fs::create_dir_all(dir.join("b"))?;
    draw_ruled_table((600, 500), (80, 120), (100, 40), 3, 2, 2).save(&first)?;
    draw_ruled_table((900, 500), (80, 120), (100, 40), 3, 2, 2).save(&second)?;

    let engine = GeometryOcr { grid: None };
    let inputs = vec![first, second];
    let results = process_batch(&inputs, &config_in(&dir), &engine)?;

    let documents: Vec<_> = results
        .iter()
        .map(|(_, result)| result.as_ref().map_err(|e| anyhow::anyhow!("{e:#}")))
        .collect::<Result<_>>()?;
    assert_eq!(documents[0].cleaned_text, "W600");
    assert_eq!(documents[1].cleaned_text, "W900");

    let first_image = documents[0].metadata.enhanced_image.as_ref().expect("first enhanced");
    let second_image = documents[1].metadata.enhanced_image.as_ref().expect("second enhanced");
    assert!(first_image != second_image);
    assert_eq!(image::image_dimensions(first_image)?.0, 600);
    assert_eq!(image::image_dimensions(second_image)?.0, 900);

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn tilted_table_is_read_after_deskew() -> Result<()> {
    let dir = temp_output_dir("tilted");
    let input = dir.join("tilted.png");
    let upright = draw_ruled_table((1200, 1000), (200, 300), (200, 60), 4, 4, 3);
    rotate_about_center(&upright, 3.0_f32.to_radians(), Interpolation::Bicubic, Luma([255])).save(&input)?;

    let engine = GeometryOcr {
        grid: Some(((200.0, 300.0), (200.0, 60.0), 4, 4)),
    };
    let mut config = config_in(&dir);
    // denoising only touches the OCR copy, not table geometry
    config.enhance.denoise_strength = 0.0;
    let document = process_image(&input, &config, &engine)?;

    let angle = document.metadata.deskew_angle.expect("tilt corrected");
    assert!((angle + 3.0).abs() < 0.3, "deskew {angle}");
    assert_eq!(document.regions.len(), 1);

    let tables: Vec<_> = document.tables().collect();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].source, TableSource::ImageGrid);
    assert_eq!(tables[0].columns, 4);
    assert_eq!(tables[0].rows[0], vec!["r0c0", "r0c1", "r0c2", "r0c3"]);
    assert_eq!(tables[0].rows[3], vec!["r3c0", "r3c1", "r3c2", "r3c3"]);

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn plain_page_uses_text_alignment_tables() -> Result<()> {
    let dir = temp_output_dir("plain");
    let input = dir.join("notes.png");
    GrayImage::from_pixel(300, 300, Luma([255])).save(&input)?;

    let engine = FakeOcr::new(OcrOutput {
        success: true,
        text: "Inventory notes\n\nitem\tcount\npens\t12\npads\t4".to_string(),
        confidence: 75.0,
        error: None,
        lines: Vec::new(),
    });
    let document = process_image(&input, &config_in(&dir), &engine)?;

    assert!(document.regions.is_empty());
    assert_eq!(*engine.layout_requests.lock().expect("lock"), vec![false]);
    let tables: Vec<_> = document.tables().collect();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].source, TableSource::TextAlignment);
    assert_eq!(tables[0].row_count, 3);
    assert!(document
        .markdown
        .ends_with("| item | count |\n| --- | --- |\n| pens | 12 |\n| pads | 4 |\n"));

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn failed_ocr_is_reported_not_fatal() -> Result<()> {
    let dir = temp_output_dir("ocrfail");
    let input = dir.join("blank.png");
    GrayImage::from_pixel(100, 100, Luma([255])).save(&input)?;

    let engine = FakeOcr::new(OcrOutput::failed("tesseract exited with status 1"));
    let document = process_image(&input, &config_in(&dir), &engine)?;

    assert_eq!(document.markdown, "");
    assert_eq!(document.metadata.ocr_confidence, None);
    assert_eq!(document.warnings, vec!["OCR failed: tesseract exited with status 1"]);

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn batch_keeps_input_order() -> Result<()> {
    let dir = temp_output_dir("batch");
    let mut inputs = Vec::new();
    for name in ["a", "b", "c", "d"] {
        let path = dir.join(format!("{name}.png"));
        GrayImage::from_pixel(80, 80, Luma([255])).save(&path)?;
        inputs.push(path);
    }
    let broken = dir.join("broken.png");
    fs::write(&broken, b"not an image")?;
    inputs.insert(2, broken.clone());

    let engine = FakeOcr::new(OcrOutput {
        success: true,
        text: "hello".to_string(),
        confidence: 99.0,
        error: None,
        lines: Vec::new(),
    });
    let results = process_batch(&inputs, &config_in(&dir), &engine)?;

    let order: Vec<&PathBuf> = results.iter().map(|(path, _)| path).collect();
    assert_eq!(order, inputs.iter().collect::<Vec<_>>());
    for (path, result) in &results {
        let document = result.as_ref().map_err(|e| anyhow::anyhow!("{e:#}"))?;
        assert_eq!(document.markdown, "hello\n");
        assert_eq!(document.warnings.is_empty(), path != &broken);
    }

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn exports_every_format() -> Result<()> {
    let dir = temp_output_dir("export");
    let input = dir.join("sheet.png");
    GrayImage::from_pixel(100, 100, Luma([255])).save(&input)?;

    let engine = FakeOcr::new(OcrOutput {
        success: true,
        text: "Results\nx^2 + y^2 = 1".to_string(),
        confidence: 80.0,
        error: None,
        lines: Vec::new(),
    });
    let mut config = config_in(&dir);
    config.detection.detect_math = true;
    let document = process_image(&input, &config, &engine)?;
    assert_eq!(document.formulas().count(), 1);

    let out = dir.join("out");
    let formats = [
        ExportFormat::Markdown,
        ExportFormat::Json,
        ExportFormat::Text,
        ExportFormat::Latex,
    ];
    let written = export_all(&document, &formats, &out)?;
    let names: Vec<String> = written
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(names, vec!["sheet.md", "sheet.json", "sheet.txt", "sheet.tex"]);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(out.join("sheet.json"))?)?;
    assert!(json["blocks"].is_array());
    assert_eq!(json["metadata"]["table_regions"], 0);

    let latex = fs::read_to_string(out.join("sheet.tex"))?;
    assert!(latex.contains("\\begin{document}"));
    assert!(latex.contains("x^{2} + y^{2} = 1"));

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn inspect_reports_grid_geometry() -> Result<()> {
    let dir = temp_output_dir("inspect");
    let input = dir.join("grid.png");
    ruled_page().save(&input)?;

    let reports = inspect_tables(&input)?;
    assert_eq!(reports.len(), 1);
    let grid = reports[0].grid.as_ref().expect("grid found");
    assert_eq!((grid.rows(), grid.columns()), (3, 2));
    assert_eq!(grid.cells.len(), 6);

    let missing = inspect_tables(&dir.join("missing.png"));
    assert!(matches!(missing, Err(PipelineError::DecodeFailure { .. })));

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::classify::TableStrategy;
use crate::core::model::{StructuredTable, TableGrid, TableSource};
use crate::ocr::OcrLine;
use crate::text::corrector::OcrTextCorrector;

const HEADER_KEYWORDS: &[&str] = &[
    "Adı", "Adi", "İsim", "Isim", "No", "Numara", "Matematik", "Türkçe", "Turkce", "Not", "Fiyat",
    "Stok", "Ürün", "Urun", "Miktar", "Tarih", "Saat", "Toplam", "Ortalama",
];

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("Invalid multi-space regex"));
static COLUMN_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}|\t").expect("Invalid column gap regex"));

/// Renders padded rows as a GitHub table; the first row is the header.
pub fn render_markdown(rows: &[Vec<String>], columns: usize) -> String {
    let render_row = |row: &[String]| {
        let cells: Vec<String> = row.iter().map(|cell| cell.replace('|', "\\|")).collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    if let Some((header, body)) = rows.split_first() {
        lines.push(render_row(header));
        lines.push(format!("| {} |", vec!["---"; columns].join(" | ")));
        lines.extend(body.iter().map(|row| render_row(row)));
    }
    lines.join("\n")
}

/// Pads every row to the widest one and renders it. Returns `None` for an
/// empty row set.
pub fn build_table(mut rows: Vec<Vec<String>>, source: TableSource) -> Option<StructuredTable> {
    let columns = rows.iter().map(Vec::len).max()?;
    if columns == 0 {
        return None;
    }
    for row in &mut rows {
        row.resize(columns, String::new());
    }
    let markdown = render_markdown(&rows, columns);
    Some(StructuredTable {
        row_count: rows.len(),
        rows,
        markdown,
        columns,
        source,
    })
}

/// Splits one row into cells: pipes first, then tabs, then runs of spaces.
pub fn split_row(line: &str) -> Vec<String> {
    let cells: Vec<&str> = if line.contains('|') {
        line.split('|').collect()
    } else if line.contains('\t') {
        line.split('\t').collect()
    } else {
        MULTI_SPACE.split(line).collect()
    };
    cells
        .into_iter()
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

/// Finds tables from column alignment in plain text.
#[derive(Debug, Clone, Default)]
pub struct TextTableDetector;

impl TextTableDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn is_candidate_row(&self, line: &str) -> bool {
        if line.contains('\t') || line.contains('|') {
            return true;
        }
        let gaps = MULTI_SPACE.find_iter(line).count();
        if gaps >= 2 {
            return true;
        }
        let tokens = COLUMN_GAP.split(line).filter(|part| !part.trim().is_empty()).count();
        let has_keyword = line
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| HEADER_KEYWORDS.contains(&word));
        has_keyword && tokens >= 2
    }

    pub fn detect(&self, text: &str) -> Vec<StructuredTable> {
        let mut tables = Vec::new();
        let mut run: Vec<&str> = Vec::new();

        for raw in text.split('\n') {
            let line = raw.trim();
            if !line.is_empty() && self.is_candidate_row(line) {
                run.push(line);
                continue;
            }
            self.close_run(&mut run, &mut tables);
        }
        self.close_run(&mut run, &mut tables);

        debug!(count = tables.len(), "text-aligned tables detected");
        tables
    }

    fn close_run(&self, run: &mut Vec<&str>, tables: &mut Vec<StructuredTable>) {
        if run.len() >= 2 {
            if let Some(table) = self.structure(run) {
                tables.push(table);
            }
        }
        run.clear();
    }

    fn structure(&self, lines: &[&str]) -> Option<StructuredTable> {
        let rows: Vec<Vec<String>> = lines
            .iter()
            .map(|line| split_row(line))
            .filter(|cells| !cells.is_empty())
            .collect();
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns < 2 {
            return None;
        }
        build_table(rows, TableSource::TextAlignment)
    }
}

impl TableStrategy for TextTableDetector {
    fn tables(&self, text: &str) -> Vec<StructuredTable> {
        self.detect(text)
    }
}

/// Fills image-derived grids with the OCR words whose centers fall inside
/// each cell.
pub struct GridTableStrategy<'a> {
    grids: &'a [TableGrid],
    lines: &'a [OcrLine],
    corrector: &'a OcrTextCorrector,
}

impl<'a> GridTableStrategy<'a> {
    pub fn new(grids: &'a [TableGrid], lines: &'a [OcrLine], corrector: &'a OcrTextCorrector) -> Self {
        Self {
            grids,
            lines,
            corrector,
        }
    }

    fn fill(&self, grid: &TableGrid) -> Vec<Vec<String>> {
        let mut rows = vec![vec![String::new(); grid.columns()]; grid.rows()];
        for word in self.lines.iter().flat_map(|line| line.words.iter()) {
            let Some(cell) = grid.cells.iter().find(|cell| cell.bbox().contains_center_of(&word.bbox)) else {
                continue;
            };
            let slot = &mut rows[cell.row_index][cell.col_index];
            if !slot.is_empty() {
                slot.push(' ');
            }
            slot.push_str(&word.text);
        }
        for slot in rows.iter_mut().flatten() {
            *slot = self.corrector.correct(slot).trim().to_string();
        }
        rows
    }
}

impl TableStrategy for GridTableStrategy<'_> {
    fn tables(&self, _text: &str) -> Vec<StructuredTable> {
        self.grids
            .iter()
            .filter_map(|grid| build_table(self.fill(grid), TableSource::ImageGrid))
            .collect()
    }
}

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::geometry::BBox;

/// Axis-aligned region of the page that looks like a ruled table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TableRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Contour area, not `width * height`.
    pub area: f32,
    pub aspect_ratio: f32,
}

impl TableRegion {
    pub fn bbox(&self) -> BBox {
        BBox::from_xywh(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    pub row_index: usize,
    pub col_index: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Cell {
    pub fn bbox(&self) -> BBox {
        BBox::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// Row and column boundaries of one ruled table, relative to the region
/// origin; cells are in page coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableGrid {
    pub row_boundaries: Vec<u32>,
    pub column_boundaries: Vec<u32>,
    pub cells: Vec<Cell>,
}

impl TableGrid {
    pub fn rows(&self) -> usize {
        self.row_boundaries.len().saturating_sub(1)
    }

    pub fn columns(&self) -> usize {
        self.column_boundaries.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    TextAlignment,
    ImageGrid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredTable {
    pub rows: Vec<Vec<String>>,
    pub markdown: String,
    pub columns: usize,
    pub row_count: usize,
    pub source: TableSource,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FormulaKind {
    Equation,
    Integral,
    Sum,
    Limit,
    Trigonometry,
    Algebra,
    Other,
}

impl FormulaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaKind::Equation => "equation",
            FormulaKind::Integral => "integral",
            FormulaKind::Sum => "sum",
            FormulaKind::Limit => "limit",
            FormulaKind::Trigonometry => "trigonometry",
            FormulaKind::Algebra => "algebra",
            FormulaKind::Other => "other",
        }
    }
}

impl fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Formula {
    pub source_line_index: usize,
    pub raw_text: String,
    pub latex: String,
    #[serde(rename = "type")]
    pub kind: FormulaKind,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeBlock {
    pub lines: Vec<String>,
    pub language: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineKind {
    Heading { level: u8 },
    ListItem,
    Paragraph,
    Blank,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextLine {
    pub kind: LineKind,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum ContentBlock {
    TextLine(TextLine),
    Table(StructuredTable),
    Code(CodeBlock),
    Formula(Formula),
}

impl ContentBlock {
    pub fn kind(&self) -> &'static str {
        match self {
            ContentBlock::TextLine(_) => "text",
            ContentBlock::Table(_) => "table",
            ContentBlock::Code(_) => "code",
            ContentBlock::Formula(_) => "math",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    /// Mean word confidence reported by the OCR engine, 0–100.
    pub ocr_confidence: Option<f32>,
    pub word_count: usize,
    pub character_count: usize,
    pub table_regions: usize,
    /// Rotation applied before OCR, in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deskew_angle: Option<f32>,
    /// Intermediate image handed to OCR, when one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_image: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub source: PathBuf,
    pub markdown: String,
    pub cleaned_text: String,
    pub blocks: Vec<ContentBlock>,
    pub regions: Vec<TableRegion>,
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DocumentResult {
    pub fn formulas(&self) -> impl Iterator<Item = &Formula> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Formula(formula) => Some(formula),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &StructuredTable> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Table(table) => Some(table),
            _ => None,
        })
    }

    pub fn file_stem(&self) -> String {
        self.source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }
}

pub mod json_export;
pub mod latex_export;
pub mod markdown_export;
pub mod text_export;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::model::DocumentResult;

pub use json_export::JsonExporter;
pub use latex_export::LatexExporter;
pub use markdown_export::{DocumentReconstructor, MarkdownExporter};
pub use text_export::TextExporter;

pub trait Exporter {
    /// Writes the document and returns the path of the written file.
    fn export(&self, document: &DocumentResult) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Json,
    Text,
    Latex,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
            ExportFormat::Latex => "tex",
        }
    }

    pub fn exporter(&self, out_dir: &Path) -> Box<dyn Exporter> {
        let out_dir = out_dir.to_path_buf();
        match self {
            ExportFormat::Markdown => Box::new(MarkdownExporter::new(out_dir)),
            ExportFormat::Json => Box::new(JsonExporter::new(out_dir)),
            ExportFormat::Text => Box::new(TextExporter::new(out_dir)),
            ExportFormat::Latex => Box::new(LatexExporter::new(out_dir)),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            "latex" | "tex" => Ok(ExportFormat::Latex),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Json => "json",
            ExportFormat::Text => "text",
            ExportFormat::Latex => "latex",
        };
        f.write_str(name)
    }
}

/// Writes `document` in every requested format into `out_dir`.
pub fn export_all(document: &DocumentResult, formats: &[ExportFormat], out_dir: &Path) -> Result<Vec<PathBuf>> {
    formats
        .iter()
        .map(|format| format.exporter(out_dir).export(document))
        .collect()
}

pub(crate) fn output_path(out_dir: &Path, document: &DocumentResult, format: ExportFormat) -> PathBuf {
    out_dir.join(format!("{}.{}", document.file_stem(), format.extension()))
}

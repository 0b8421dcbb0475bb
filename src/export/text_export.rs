use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::classify::math::format_for_markdown;
use crate::core::model::DocumentResult;
use crate::export::{output_path, ExportFormat, Exporter};

/// Plain corrected text, with recognized formula lines swapped for their
/// `$..$` form.
#[derive(Debug, Clone)]
pub struct TextExporter {
    out_dir: PathBuf,
}

impl TextExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    fn format_document(document: &DocumentResult) -> String {
        let formulas: Vec<_> = document.formulas().cloned().collect();
        let mut text = if formulas.is_empty() {
            document.cleaned_text.clone()
        } else {
            format_for_markdown(&formulas, &document.cleaned_text)
        };
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }
}

impl Exporter for TextExporter {
    fn export(&self, document: &DocumentResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;
        let path = output_path(&self.out_dir, document, ExportFormat::Text);
        fs::write(&path, Self::format_document(document))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::model::DocumentResult;
use crate::export::{output_path, ExportFormat, Exporter};

#[derive(Debug, Clone)]
pub struct JsonExporter {
    out_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl Exporter for JsonExporter {
    fn export(&self, document: &DocumentResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;
        let path = output_path(&self.out_dir, document, ExportFormat::Json);
        let data = serde_json::to_string_pretty(document)?;
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

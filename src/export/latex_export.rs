use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::model::{DocumentResult, Formula};
use crate::export::{output_path, ExportFormat, Exporter};

/// Standalone LaTeX article listing the recognized formulas, one section
/// per formula type.
#[derive(Debug, Clone)]
pub struct LatexExporter {
    out_dir: PathBuf,
}

impl LatexExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn latex_document<'a>(formulas: impl IntoIterator<Item = &'a Formula>, title: &str) -> String {
    let mut by_kind: BTreeMap<&str, Vec<&Formula>> = BTreeMap::new();
    for formula in formulas {
        by_kind.entry(formula.kind.as_str()).or_default().push(formula);
    }

    let mut lines = vec![
        r"\documentclass{article}".to_string(),
        r"\usepackage{amsmath}".to_string(),
        r"\usepackage{amssymb}".to_string(),
        r"\begin{document}".to_string(),
        format!(r"\title{{{title}}}"),
        r"\maketitle".to_string(),
        String::new(),
    ];

    for (kind, formulas) in by_kind {
        lines.push(format!(r"\section{{{}}}", title_case(kind)));
        lines.push(String::new());
        for formula in formulas {
            if formula.inline {
                lines.push(format!("${}$", formula.latex));
            } else {
                lines.push(r"\begin{equation}".to_string());
                lines.push(formula.latex.clone());
                lines.push(r"\end{equation}".to_string());
            }
            lines.push(String::new());
        }
    }

    lines.push(r"\end{document}".to_string());
    lines.join("\n")
}

impl Exporter for LatexExporter {
    fn export(&self, document: &DocumentResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;
        let path = output_path(&self.out_dir, document, ExportFormat::Latex);
        let body = latex_document(document.formulas(), "Mathematical Formulas");
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::classify::math::render_formula;
use crate::classify::Classified;
use crate::core::model::{CodeBlock, ContentBlock, DocumentResult, LineKind, TextLine};
use crate::export::{output_path, ExportFormat, Exporter};

/// Ordered blocks and the markdown rendered from them.
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub blocks: Vec<ContentBlock>,
    pub markdown: String,
}

/// Reassembles corrected text and detected blocks into one markdown
/// document: the line stream first, then tables, code and formulas.
///
/// Detected blocks are appended after the text rather than spliced at
/// their source position, so a table also appears as plain lines above.
#[derive(Debug, Clone, Default)]
pub struct DocumentReconstructor;

impl DocumentReconstructor {
    pub fn new() -> Self {
        Self
    }

    pub fn reconstruct(&self, text: &str, classified: &Classified) -> Reconstruction {
        let mut blocks: Vec<ContentBlock> = text
            .split('\n')
            .map(|line| ContentBlock::TextLine(classify_line(line)))
            .collect();
        blocks.extend(classified.tables.iter().cloned().map(ContentBlock::Table));
        blocks.extend(classified.code.iter().cloned().map(ContentBlock::Code));
        blocks.extend(classified.formulas.iter().cloned().map(ContentBlock::Formula));

        let markdown = render_markdown(&blocks);
        debug!(blocks = blocks.len(), chars = markdown.len(), "document reconstructed");
        Reconstruction { blocks, markdown }
    }
}

/// Heading, list item, paragraph or blank, from the line's shape alone.
pub fn classify_line(line: &str) -> TextLine {
    let text = line.trim();
    if text.is_empty() {
        return TextLine {
            kind: LineKind::Blank,
            text: String::new(),
        };
    }

    let length = text.chars().count();
    if length < 80 && (is_upper(text) || is_title(text)) {
        let level = if length < 30 { 1 } else { 2 };
        return TextLine {
            kind: LineKind::Heading { level },
            text: text.to_string(),
        };
    }

    if is_list_item(text) {
        let text = match text.strip_prefix('•') {
            Some(rest) => format!("- {}", rest.trim_start()),
            None => text.to_string(),
        };
        return TextLine {
            kind: LineKind::ListItem,
            text,
        };
    }

    TextLine {
        kind: LineKind::Paragraph,
        text: text.to_string(),
    }
}

fn is_list_item(text: &str) -> bool {
    if text.starts_with('-') || text.starts_with('•') {
        return true;
    }
    let mut chars = text.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(first), Some(second), Some(_)) => first.is_ascii_digit() && matches!(second, '.' | ')'),
        _ => false,
    }
}

/// At least one cased character and no lowercase ones.
fn is_upper(text: &str) -> bool {
    let mut cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

/// Every word starts with an uppercase letter followed only by lowercase ones.
fn is_title(text: &str) -> bool {
    let mut previous_cased = false;
    let mut cased = false;
    for c in text.chars() {
        if c.is_uppercase() {
            if previous_cased {
                return false;
            }
            previous_cased = true;
            cased = true;
        } else if c.is_lowercase() {
            if !previous_cased {
                return false;
            }
            previous_cased = true;
            cased = true;
        } else {
            previous_cased = false;
        }
    }
    cased
}

fn render_line(line: &TextLine) -> String {
    match line.kind {
        LineKind::Heading { level } => format!("{} {}", "#".repeat(level as usize), line.text),
        LineKind::ListItem | LineKind::Paragraph => line.text.clone(),
        LineKind::Blank => String::new(),
    }
}

fn render_code(code: &CodeBlock) -> String {
    format!("```{}\n{}\n```", code.language, code.lines.join("\n"))
}

pub fn render_markdown(blocks: &[ContentBlock]) -> String {
    let stream: Vec<String> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::TextLine(line) => Some(render_line(line)),
            _ => None,
        })
        .collect();
    let body = stream.join("\n");

    let mut sections: Vec<String> = Vec::new();
    let body = body.trim_matches('\n');
    if !body.trim().is_empty() {
        sections.push(body.to_string());
    }
    for block in blocks {
        match block {
            ContentBlock::TextLine(_) => {}
            ContentBlock::Table(table) => sections.push(table.markdown.clone()),
            ContentBlock::Code(code) => sections.push(render_code(code)),
            ContentBlock::Formula(formula) => sections.push(render_formula(formula)),
        }
    }

    if sections.is_empty() {
        return String::new();
    }
    let mut markdown = sections.join("\n\n");
    markdown.push('\n');
    markdown
}

#[derive(Debug, Clone)]
pub struct MarkdownExporter {
    out_dir: PathBuf,
}

impl MarkdownExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl Exporter for MarkdownExporter {
    fn export(&self, document: &DocumentResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;
        let path = output_path(&self.out_dir, document, ExportFormat::Markdown);
        fs::write(&path, &document.markdown)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ContentClassifier;
    use crate::core::model::{Formula, FormulaKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_line_shapes() {
        assert_eq!(classify_line("INTRODUCTION").kind, LineKind::Heading { level: 1 });
        assert_eq!(
            classify_line("A Rather Long Title That Keeps Going On").kind,
            LineKind::Heading { level: 2 }
        );
        assert_eq!(classify_line("1. first step").kind, LineKind::ListItem);
        assert_eq!(classify_line("• bullet").text, "- bullet");
        assert_eq!(classify_line("plain sentence here.").kind, LineKind::Paragraph);
        assert_eq!(classify_line("   ").kind, LineKind::Blank);
        assert_eq!(classify_line("Alice 28 NY").kind, LineKind::Paragraph);
    }

    #[test]
    fn appends_blocks_after_text() {
        let text = "REPORT\nsome notes here\nname\tage\nalice\t28";
        let classified = ContentClassifier::default().classify_text(text);
        let result = DocumentReconstructor::new().reconstruct(text, &classified);

        assert_eq!(
            result.markdown,
            "# REPORT\nsome notes here\nname\tage\nalice\t28\n\n| name | age |\n| --- | --- |\n| alice | 28 |\n"
        );
        let kinds: Vec<&str> = result.blocks.iter().map(ContentBlock::kind).collect();
        assert_eq!(kinds, vec!["text", "text", "text", "text", "table"]);
    }

    #[test]
    fn renders_code_and_math_fallbacks() {
        let classified = Classified {
            tables: vec![],
            code: vec![CodeBlock {
                lines: vec!["x = 1".to_string()],
                language: "python".to_string(),
            }],
            formulas: vec![
                Formula {
                    source_line_index: 0,
                    raw_text: "a = b".to_string(),
                    latex: "a = b".to_string(),
                    kind: FormulaKind::Equation,
                    inline: false,
                },
                Formula {
                    source_line_index: 1,
                    raw_text: "??".to_string(),
                    latex: String::new(),
                    kind: FormulaKind::Other,
                    inline: true,
                },
            ],
        };
        let result = DocumentReconstructor::new().reconstruct("", &classified);
        assert_eq!(
            result.markdown,
            "```python\nx = 1\n```\n\n$$a = b$$\n\n*Math: ??*\n"
        );
    }
}

//! Turns Tesseract TSV output into lines of positioned words.
//!
//! With layout preservation on, a gap wider than the line height becomes a
//! tab so column alignment survives whitespace cleanup downstream.

use tracing::warn;

use crate::core::geometry::BBox;
use crate::ocr::{OcrLine, OcrOutput, OcrWord};

const WORD_LEVEL: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineKey {
    page: u32,
    block: u32,
    paragraph: u32,
    line: u32,
}

#[derive(Debug, Clone, Default)]
pub struct OcrLayoutBuilder {
    preserve_layout: bool,
}

impl OcrLayoutBuilder {
    pub fn new(preserve_layout: bool) -> Self {
        Self { preserve_layout }
    }

    pub fn build(&self, tsv: &str) -> OcrOutput {
        let mut lines: Vec<(LineKey, Vec<OcrWord>)> = Vec::new();

        for (index, row) in tsv.lines().enumerate() {
            if index == 0 && row.starts_with("level") {
                continue;
            }
            let Some((key, word)) = parse_row(row) else {
                continue;
            };
            match lines.last_mut() {
                Some((last_key, words)) if *last_key == key => words.push(word),
                _ => lines.push((key, vec![word])),
            }
        }

        let confidences: Vec<f32> = lines
            .iter()
            .flat_map(|(_, words)| words.iter())
            .map(|word| word.confidence)
            .filter(|conf| *conf > 0.0)
            .collect();
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        let mut text = String::new();
        let mut ocr_lines = Vec::with_capacity(lines.len());
        let mut previous: Option<LineKey> = None;
        for (key, words) in lines {
            let starts_paragraph = previous.map_or(true, |prev| {
                prev.page != key.page || prev.block != key.block || prev.paragraph != key.paragraph
            });
            if previous.is_some() {
                text.push('\n');
                if starts_paragraph {
                    text.push('\n');
                }
            }
            let mut line = self.assemble_line(words);
            line.starts_paragraph = starts_paragraph;
            text.push_str(&line.text);
            ocr_lines.push(line);
            previous = Some(key);
        }

        OcrOutput {
            success: true,
            text,
            confidence,
            error: None,
            lines: ocr_lines,
        }
    }

    fn assemble_line(&self, words: Vec<OcrWord>) -> OcrLine {
        let mut text = String::new();
        let mut bbox: Option<BBox> = None;
        let height = words
            .iter()
            .map(|word| word.bbox.height())
            .fold(0.0f32, f32::max);

        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                let gap = word.bbox.x0 - words[i - 1].bbox.x1;
                if self.preserve_layout && height > 0.0 && gap > height {
                    text.push('\t');
                } else {
                    text.push(' ');
                }
            }
            text.push_str(&word.text);
            bbox = Some(match bbox {
                Some(acc) => acc.union(&word.bbox),
                None => word.bbox,
            });
        }

        OcrLine {
            text,
            bbox: bbox.unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0)),
            words,
            starts_paragraph: false,
        }
    }
}

fn parse_row(row: &str) -> Option<(LineKey, OcrWord)> {
    let fields: Vec<&str> = row.splitn(12, '\t').collect();
    if fields.len() < 12 {
        return None;
    }
    let level: u32 = fields[0].trim().parse().ok()?;
    if level != WORD_LEVEL {
        return None;
    }
    let text = fields[11].trim();
    if text.is_empty() {
        return None;
    }

    let numbers: Option<Vec<u32>> = fields[1..10].iter().map(|f| f.trim().parse().ok()).collect();
    let Some(numbers) = numbers else {
        warn!(row, "skipping malformed OCR row");
        return None;
    };
    let confidence: f32 = fields[10].trim().parse().unwrap_or(-1.0);

    let key = LineKey {
        page: numbers[0],
        block: numbers[1],
        paragraph: numbers[2],
        line: numbers[3],
    };
    let (left, top, width, height) = (numbers[5], numbers[6], numbers[7], numbers[8]);
    Some((
        key,
        OcrWord {
            text: text.to_string(),
            bbox: BBox::from_xywh(left, top, width, height),
            confidence,
        },
    ))
}

pub mod code;
pub mod math;
pub mod table;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::model::{CodeBlock, Formula, StructuredTable};

use self::code::CodeBlockDetector;
use self::math::MathFormulaRecognizer;
use self::table::TextTableDetector;

/// Source of tables for one document: text alignment or image geometry.
pub trait TableStrategy {
    fn tables(&self, text: &str) -> Vec<StructuredTable>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DetectionConfig {
    pub detect_tables: bool,
    pub detect_code: bool,
    pub detect_math: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detect_tables: true,
            detect_code: true,
            detect_math: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classified {
    pub tables: Vec<StructuredTable>,
    pub code: Vec<CodeBlock>,
    pub formulas: Vec<Formula>,
}

/// Runs the table, code and math passes over corrected text. Each pass only
/// extracts candidates; the text itself is left as is.
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    config: DetectionConfig,
    code: CodeBlockDetector,
    math: MathFormulaRecognizer,
}

impl ContentClassifier {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            code: CodeBlockDetector::default(),
            math: MathFormulaRecognizer::default(),
        }
    }

    pub fn classify(&self, text: &str, tables: &dyn TableStrategy) -> Classified {
        let classified = Classified {
            tables: if self.config.detect_tables {
                tables.tables(text)
            } else {
                Vec::new()
            },
            code: if self.config.detect_code {
                self.code.detect(text)
            } else {
                Vec::new()
            },
            formulas: if self.config.detect_math {
                self.math.recognize(text)
            } else {
                Vec::new()
            },
        };
        info!(
            tables = classified.tables.len(),
            code = classified.code.len(),
            formulas = classified.formulas.len(),
            "content classified"
        );
        classified
    }

    /// Classification when no image geometry is available.
    pub fn classify_text(&self, text: &str) -> Classified {
        self.classify(text, &TextTableDetector::new())
    }
}

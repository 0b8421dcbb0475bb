pub mod bridge;
pub mod layout_builder;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;
use crate::core::geometry::BBox;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BBox,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrLine {
    pub text: String,
    pub bbox: BBox,
    pub words: Vec<OcrWord>,
    /// First line of a new block or paragraph.
    #[serde(default)]
    pub starts_paragraph: bool,
}

/// What the OCR collaborator hands back for one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrOutput {
    pub success: bool,
    pub text: String,
    /// Mean word confidence, 0-100.
    pub confidence: f32,
    pub error: Option<String>,
    #[serde(default)]
    pub lines: Vec<OcrLine>,
}

impl OcrOutput {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub language: String,
    /// Keep runs of spaces between words so column alignment survives.
    pub preserve_layout: bool,
}

impl OcrRequest {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            preserve_layout: false,
        }
    }

    pub fn with_layout(mut self, preserve_layout: bool) -> Self {
        self.preserve_layout = preserve_layout;
        self
    }
}

pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &Path, request: &OcrRequest) -> Result<OcrOutput, PipelineError>;
}

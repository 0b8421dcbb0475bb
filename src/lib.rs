pub mod classify;
pub mod core;
pub mod export;
pub mod ocr;
pub mod pipeline;
pub mod text;
pub mod vision;

pub use crate::core::error::PipelineError;
pub use crate::core::model::{ContentBlock, DocumentResult, StructuredTable, TableGrid, TableRegion};
pub use crate::pipeline::{process_batch, process_image, PipelineConfig};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG` (default `warn`).
/// Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

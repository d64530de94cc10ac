//! Progress-callback trait for per-stage export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::ExportConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages. The CLI drives its
//! spinner from these; a GUI or service can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use page2deck::{ExportConfig, ExportProgressCallback, ExportStage};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl ExportProgressCallback for Log {
//!     fn on_stage_complete(&self, stage: ExportStage, detail: &str) {
//!         eprintln!("{stage}: {detail}");
//!     }
//! }
//!
//! let config = ExportConfig::builder()
//!     .progress_callback(Arc::new(Log))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStage {
    Retrieve,
    Transduce,
    Reshape,
    Render,
    Capture,
    Save,
}

impl ExportStage {
    pub const ALL: [ExportStage; 6] = [
        ExportStage::Retrieve,
        ExportStage::Transduce,
        ExportStage::Reshape,
        ExportStage::Render,
        ExportStage::Capture,
        ExportStage::Save,
    ];

    /// Human-readable label for progress displays.
    pub fn label(self) -> &'static str {
        match self {
            ExportStage::Retrieve => "Retrieving page",
            ExportStage::Transduce => "Converting blocks to Markdown",
            ExportStage::Reshape => "Reshaping into slides",
            ExportStage::Render => "Rendering slides",
            ExportStage::Capture => "Printing PDF",
            ExportStage::Save => "Saving",
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportStage::Retrieve => "retrieve",
            ExportStage::Transduce => "transduce",
            ExportStage::Reshape => "reshape",
            ExportStage::Render => "render",
            ExportStage::Capture => "capture",
            ExportStage::Save => "save",
        };
        f.write_str(name)
    }
}

/// Called by the export pipeline at stage boundaries.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Stages run sequentially, so calls never overlap
/// within one export.
pub trait ExportProgressCallback: Send + Sync {
    /// A stage is about to start.
    fn on_stage_start(&self, stage: ExportStage) {
        let _ = stage;
    }

    /// A stage finished. `detail` is a short summary such as `"42 blocks"`.
    fn on_stage_complete(&self, stage: ExportStage, detail: &str) {
        let _ = (stage, detail);
    }

    /// A stage failed; the export stops after this call.
    fn on_stage_error(&self, stage: ExportStage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExportConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;

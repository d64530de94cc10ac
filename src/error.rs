//! Error types for the page2deck library.
//!
//! Two error types reflect two layers of failure:
//!
//! * [`DeckError`] — **Fatal for one export**: missing credentials, an
//!   upstream API refusing a request, a reshaper returning nothing usable, a
//!   capture that failed, or a write that could not happen. Returned as
//!   `Err(DeckError)` from every public entry point.
//!
//! * [`CaptureError`] — a failure inside the capture state machine, tagged
//!   with the [`CaptureStage`] where it happened. It is always raised *after*
//!   the rendering surface has been released, and converts into
//!   [`DeckError::Capture`].
//!
//! Nothing here is fatal to the host process: each export attempt is
//! isolated, and a later attempt may succeed independently.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the page2deck library.
#[derive(Debug, Error)]
pub enum DeckError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// A required credential is absent or blank.
    #[error("Missing credential: {name}\nSet it in the configuration (or via its environment variable) before exporting.")]
    MissingCredential { name: &'static str },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Upstream retrieval errors ─────────────────────────────────────────
    /// The input is not a page id, a dashed UUID, or a page URL.
    #[error("Invalid page id '{input}': expected 32 hex characters, a UUID, or a page URL")]
    InvalidPageId { input: String },

    /// The document API answered with a non-success status.
    #[error("Document API returned HTTP {status} while retrieving {what}: {detail}")]
    RetrievalFailed {
        status: u16,
        what: String,
        detail: String,
    },

    /// The document API could not be reached or returned an unreadable body.
    #[error("Document API request failed: {detail}")]
    RetrievalTransport { detail: String },

    /// The configured block cap was exceeded.
    #[error("Document has more than {limit} blocks; raise max_blocks to export it")]
    BlockLimitExceeded { limit: usize },

    // ── Reshaper errors ───────────────────────────────────────────────────
    /// The reshaper answered with a non-success status.
    #[error("Reshaper API error {status}: {message}")]
    ReshaperHttp { status: u16, message: String },

    /// The reshaper could not be reached, or the provider call failed.
    #[error("Reshaper request failed: {detail}")]
    ReshaperTransport { detail: String },

    /// The reshaper answered successfully but no slide text could be extracted.
    #[error("Reshaper response contained no extractable text")]
    ReshaperEmpty,

    /// The configured LLM provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The slide Markdown produced no slides.
    #[error("Nothing to render: the slide Markdown contains no slides")]
    NothingToRender,

    // ── Capture errors ────────────────────────────────────────────────────
    /// PDF capture failed; the rendering surface has already been released.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    // ── Output errors ─────────────────────────────────────────────────────
    /// The user declined the save prompt.
    #[error("Save cancelled by user")]
    SaveCancelled,

    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeckError {
    /// Short name of the pipeline stage this error belongs to, for log context.
    pub fn stage(&self) -> &'static str {
        match self {
            DeckError::MissingCredential { .. } | DeckError::InvalidConfig(_) => "config",
            DeckError::InvalidPageId { .. }
            | DeckError::RetrievalFailed { .. }
            | DeckError::RetrievalTransport { .. }
            | DeckError::BlockLimitExceeded { .. } => "retrieve",
            DeckError::ReshaperHttp { .. }
            | DeckError::ReshaperTransport { .. }
            | DeckError::ReshaperEmpty
            | DeckError::ProviderNotConfigured { .. } => "reshape",
            DeckError::NothingToRender => "render",
            DeckError::Capture(_) => "capture",
            DeckError::SaveCancelled | DeckError::OutputWriteFailed { .. } => "save",
            DeckError::Internal(_) => "internal",
        }
    }
}

/// Where in the capture lifecycle a [`CaptureError`] happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    /// Starting or connecting to the browser.
    Launch,
    /// Creating the rendering surface.
    Create,
    /// Waiting for the surface to finish loading the document.
    Load,
    /// Opening the debugging session.
    Attach,
    /// `Page.enable` / `Page.printToPDF`.
    Print,
    /// Decoding the returned PDF payload.
    Decode,
    /// Detaching the session or disposing the surface.
    Release,
}

impl fmt::Display for CaptureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureStage::Launch => "launch",
            CaptureStage::Create => "create",
            CaptureStage::Load => "load",
            CaptureStage::Attach => "attach",
            CaptureStage::Print => "print",
            CaptureStage::Decode => "decode",
            CaptureStage::Release => "release",
        };
        f.write_str(name)
    }
}

/// A failed capture transition.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// A protocol step failed.
    #[error("Capture failed at {stage}: {detail}")]
    Stage { stage: CaptureStage, detail: String },

    /// The surface did not report load completion within the configured bound.
    #[error("Capture failed at load: document did not finish loading within {secs}s")]
    LoadTimeout { secs: u64 },
}

impl CaptureError {
    pub fn new(stage: CaptureStage, detail: impl Into<String>) -> Self {
        CaptureError::Stage {
            stage,
            detail: detail.into(),
        }
    }

    /// The lifecycle stage that failed.
    pub fn stage(&self) -> CaptureStage {
        match self {
            CaptureError::Stage { stage, .. } => *stage,
            CaptureError::LoadTimeout { .. } => CaptureStage::Load,
        }
    }
}

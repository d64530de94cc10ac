//! # page2deck
//!
//! Turn a Notion page into a slide-deck PDF.
//!
//! A page's block tree is flattened into Markdown, an LLM reshapes that
//! Markdown into Marp-style slides, and a headless browser prints the
//! rendered slides to a 16:9 PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Notion page
//!  │
//!  ├─ 1. Retrieve   drain the paginated block API (recursively)
//!  ├─ 2. Transduce  block tree → Markdown (list runs kept together)
//!  ├─ 3. Reshape    LLM → slide Markdown (`---` between slides)
//!  ├─ 4. Extract    strip the code fence the model wrapped it in
//!  ├─ 5. Render     slides → HTML + CSS → standalone document
//!  ├─ 6. Capture    Chrome DevTools: load → attach → printToPDF → release
//!  └─ 7. Save       `<title>.pdf`, written atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page2deck::{export_page, ExportConfig, FileSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::builder()
//!         .document_token(std::env::var("NOTION_TOKEN")?)
//!         .reshaper_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let out = export_page("0123456789abcdef0123456789abcdef", &config, &FileSink::new(".")).await?;
//!     eprintln!("{} slides → {}", out.stats.slide_count, out.path.display());
//!     Ok(())
//! }
//! ```
//!
//! The transducer and fence extractor are plain functions and need no
//! network:
//!
//! ```rust
//! use page2deck::{blocks_to_markdown, extract_markdown, Block};
//!
//! let md = blocks_to_markdown(&[
//!     Block::heading(1, "Intro"),
//!     Block::bulleted("a"),
//!     Block::bulleted("b").with_children(vec![Block::paragraph("nested")]),
//! ]);
//! assert!(md.starts_with("# Intro\n\n- a\n- b\n  nested\n"));
//!
//! assert_eq!(extract_markdown("```marp\n# Deck\n```"), "# Deck");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `page2deck` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! page2deck = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod block;
pub mod cdp;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use block::{Block, BlockKind, ImageSource, ListKind};
pub use cdp::{BrowserSource, CdpHost};
pub use config::{Credentials, ExportConfig, ExportConfigBuilder};
pub use error::{CaptureError, CaptureStage, DeckError};
pub use export::{
    export_page, markdown_to_pdf, markdown_to_pdf_with, page_markdown, ExportOutput, ExportStats,
    PageMarkdown, SavedDeck,
};
pub use pipeline::capture::{
    capture_pdf, pdf_filename, sanitize_filename, CaptureOptions, CaptureSession, DebugSession,
    LifecycleState, RenderHost, RenderSurface,
};
pub use pipeline::fence::extract_markdown;
pub use pipeline::reshape::{ProviderReshaper, Reshaper, ResponsesReshaper};
pub use pipeline::sink::{ArtifactSink, FileSink, SaveConfirmer, SaveDecision};
pub use pipeline::slides::{wrap_document, BasicSlideRenderer, RenderedSlides, SlideRenderer};
pub use pipeline::source::{parse_page_id, NotionSource};
pub use pipeline::transduce::blocks_to_markdown;
pub use progress::{ExportProgressCallback, ExportStage, NoopProgressCallback};

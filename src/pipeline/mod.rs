//! Pipeline stages for page-to-deck export.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the external collaborators (document API, LLM, browser, disk)
//! sit behind their own seams.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ transduce ──▶ reshape ──▶ fence ──▶ slides ──▶ capture ──▶ sink
//! (blocks)   (Markdown)    (LLM)      (strip)   (HTML)     (PDF)       (file)
//! ```
//!
//! 1. [`source`]    — drain the paginated block API into an ordered tree
//! 2. [`transduce`] — pure block tree → Markdown; groups list runs
//! 3. [`reshape`]   — the only LLM call: document → Marp slide Markdown
//! 4. [`fence`]     — remove a code fence the model wrapped its answer in
//! 5. [`slides`]    — split on `---`, render each slide, wrap the document
//! 6. [`capture`]   — drive a rendering surface through print-to-PDF with
//!    guaranteed release
//! 7. [`sink`]      — confirm the destination and write atomically

pub mod capture;
pub mod fence;
pub mod reshape;
pub mod sink;
pub mod slides;
pub mod source;
pub mod transduce;

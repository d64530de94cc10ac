//! Top-level export functions.
//!
//! ## Pipeline
//!
//! ```text
//! page id / URL
//!   │
//!   ├─ 1. Retrieve   paginated, recursive block fetch + page title
//!   ├─ 2. Transduce  block tree → document Markdown
//!   ├─ 3. Reshape    LLM → slide Markdown, enclosing fence stripped
//!   ├─ 4. Render     slide Markdown → HTML + CSS → standalone document
//!   ├─ 5. Capture    headless browser prints the document to PDF
//!   └─ 6. Save       sink persists `<title>.pdf`
//! ```
//!
//! Credentials are checked before any network work starts. Stages run
//! strictly in sequence; the first failure aborts the export and nothing
//! partial is saved.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::block::Block;
use crate::cdp::CdpHost;
use crate::config::ExportConfig;
use crate::error::DeckError;
use crate::pipeline::capture::{capture_pdf, pdf_filename, CaptureOptions, RenderHost};
use crate::pipeline::fence::extract_markdown;
use crate::pipeline::reshape::resolve_reshaper;
use crate::pipeline::sink::ArtifactSink;
use crate::pipeline::slides::{wrap_document, BasicSlideRenderer, SlideRenderer};
use crate::pipeline::source::{parse_page_id, NotionSource};
use crate::pipeline::transduce::blocks_to_markdown;
use crate::progress::ExportStage;

/// Title used when neither the config nor the page supplies one.
pub const DEFAULT_TITLE: &str = "slides";

/// Timings and sizes for one export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportStats {
    /// Blocks retrieved, at every depth.
    pub block_count: usize,
    pub markdown_bytes: usize,
    pub slide_count: usize,
    pub pdf_bytes: usize,
    pub retrieve_ms: u64,
    pub reshape_ms: u64,
    pub capture_ms: u64,
    pub total_ms: u64,
}

/// Everything an export produced.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Where the sink saved the PDF.
    pub path: PathBuf,
    pub title: String,
    /// Transducer output.
    pub markdown: String,
    /// Reshaper output after fence extraction.
    pub slide_markdown: String,
    pub pdf_len: usize,
    pub stats: ExportStats,
}

/// A page's title and Markdown, before reshaping.
#[derive(Debug, Clone)]
pub struct PageMarkdown {
    pub title: String,
    pub markdown: String,
    pub block_count: usize,
}

/// A saved PDF.
#[derive(Debug, Clone)]
pub struct SavedDeck {
    pub path: PathBuf,
    pub pdf_len: usize,
    pub slide_count: usize,
    pub capture_ms: u64,
}

/// Stage bookkeeping: progress events plus failure logging.
struct Stages<'a> {
    config: &'a ExportConfig,
}

impl Stages<'_> {
    fn start(&self, stage: ExportStage) {
        info!("{}…", stage.label());
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_start(stage);
        }
    }

    fn done(&self, stage: ExportStage, detail: &str) {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_complete(stage, detail);
        }
    }

    fn check<T>(&self, stage: ExportStage, result: Result<T, DeckError>) -> Result<T, DeckError> {
        if let Err(e) = &result {
            warn!("{} failed: {}", stage, e);
            if let Some(cb) = &self.config.progress_callback {
                cb.on_stage_error(stage, &e.to_string());
            }
        }
        result
    }
}

fn millis(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Export one page to a slide-deck PDF.
///
/// `page` is a page id, a dashed UUID, or a page URL.
///
/// # Example
/// ```rust,no_run
/// use page2deck::{export_page, ExportConfig, FileSink};
///
/// # async fn run() -> Result<(), page2deck::DeckError> {
/// let config = ExportConfig::builder()
///     .document_token(std::env::var("NOTION_TOKEN").unwrap_or_default())
///     .reshaper_key(std::env::var("OPENAI_API_KEY").unwrap_or_default())
///     .build()?;
/// let out = export_page("https://www.notion.so/Plan-0123456789abcdef0123456789abcdef", &config, &FileSink::new(".")).await?;
/// println!("{} ({} slides)", out.path.display(), out.stats.slide_count);
/// # Ok(())
/// # }
/// ```
pub async fn export_page(
    page: &str,
    config: &ExportConfig,
    sink: &dyn ArtifactSink,
) -> Result<ExportOutput, DeckError> {
    let total_start = Instant::now();
    config.check_credentials()?;

    let retrieve_start = Instant::now();
    let page_md = page_markdown(page, config).await?;
    let retrieve_ms = millis(retrieve_start);

    let stages = Stages { config };
    stages.start(ExportStage::Reshape);
    let reshape_start = Instant::now();
    let slide_markdown = stages.check(ExportStage::Reshape, reshape(&page_md.markdown, config).await)?;
    let reshape_ms = millis(reshape_start);
    stages.done(
        ExportStage::Reshape,
        &format!("{} bytes of slide Markdown", slide_markdown.len()),
    );

    let saved = markdown_to_pdf(&slide_markdown, &page_md.title, config, sink).await?;

    let stats = ExportStats {
        block_count: page_md.block_count,
        markdown_bytes: page_md.markdown.len(),
        slide_count: saved.slide_count,
        pdf_bytes: saved.pdf_len,
        retrieve_ms,
        reshape_ms,
        capture_ms: saved.capture_ms,
        total_ms: millis(total_start),
    };
    info!(
        "Exported '{}' → {} ({} slides, {} bytes) in {}ms",
        page_md.title,
        saved.path.display(),
        stats.slide_count,
        stats.pdf_bytes,
        stats.total_ms
    );

    Ok(ExportOutput {
        path: saved.path,
        title: page_md.title,
        markdown: page_md.markdown,
        slide_markdown,
        pdf_len: saved.pdf_len,
        stats,
    })
}

/// Retrieve a page and transduce it to Markdown. Needs only the document token.
pub async fn page_markdown(page: &str, config: &ExportConfig) -> Result<PageMarkdown, DeckError> {
    let token = config.require_document_token()?;
    let page_id = parse_page_id(page)?;
    let stages = Stages { config };

    stages.start(ExportStage::Retrieve);
    let (title, blocks) =
        stages.check(ExportStage::Retrieve, retrieve(&page_id, token, config).await)?;
    let block_count: usize = blocks.iter().map(Block::subtree_len).sum();
    stages.done(ExportStage::Retrieve, &format!("{block_count} blocks"));

    stages.start(ExportStage::Transduce);
    let markdown = blocks_to_markdown(&blocks);
    stages.done(ExportStage::Transduce, &format!("{} bytes", markdown.len()));

    Ok(PageMarkdown {
        title,
        markdown,
        block_count,
    })
}

async fn retrieve(
    page_id: &str,
    token: &str,
    config: &ExportConfig,
) -> Result<(String, Vec<Block>), DeckError> {
    let source = NotionSource::new(
        &config.notion_base_url,
        token,
        &config.notion_version,
        Duration::from_secs(config.download_timeout_secs),
    )?
    .with_page_size(config.page_size)
    .with_max_blocks(config.max_blocks);

    let title = match &config.title {
        Some(t) => t.clone(),
        None => source
            .fetch_title(page_id)
            .await?
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
    };
    let blocks = source.fetch_blocks(page_id).await?;
    Ok((title, blocks))
}

async fn reshape(markdown: &str, config: &ExportConfig) -> Result<String, DeckError> {
    let reshaper = resolve_reshaper(config)?;
    info!("Reshaping with {}", reshaper.describe());
    let raw = reshaper.reshape(markdown).await?;
    let slides = extract_markdown(&raw);
    if slides.is_empty() {
        return Err(DeckError::ReshaperEmpty);
    }
    Ok(slides)
}

/// Render slide Markdown, capture it as PDF on the configured browser, and
/// hand the bytes to `sink` as `<title>.pdf`.
pub async fn markdown_to_pdf(
    slide_markdown: &str,
    title: &str,
    config: &ExportConfig,
    sink: &dyn ArtifactSink,
) -> Result<SavedDeck, DeckError> {
    let stages = Stages { config };
    let (html, slide_count) =
        stages.check(ExportStage::Render, render_document(slide_markdown, config, &stages))?;

    stages.start(ExportStage::Capture);
    let host = stages.check(
        ExportStage::Capture,
        CdpHost::open(&config.browser).await.map_err(DeckError::from),
    )?;
    let captured = capture_document(&host, &html, config, &stages).await;
    host.shutdown().await;
    let (pdf, capture_ms) = captured?;

    save(&pdf, title, slide_count, capture_ms, sink, &stages).await
}

/// [`markdown_to_pdf`] against a caller-supplied rendering host.
pub async fn markdown_to_pdf_with<H: RenderHost>(
    host: &H,
    slide_markdown: &str,
    title: &str,
    config: &ExportConfig,
    sink: &dyn ArtifactSink,
) -> Result<SavedDeck, DeckError> {
    let stages = Stages { config };
    let (html, slide_count) =
        stages.check(ExportStage::Render, render_document(slide_markdown, config, &stages))?;

    stages.start(ExportStage::Capture);
    let (pdf, capture_ms) = capture_document(host, &html, config, &stages).await?;

    save(&pdf, title, slide_count, capture_ms, sink, &stages).await
}

fn render_document(
    slide_markdown: &str,
    config: &ExportConfig,
    stages: &Stages<'_>,
) -> Result<(String, usize), DeckError> {
    stages.start(ExportStage::Render);
    let renderer = match &config.extra_css {
        Some(css) => BasicSlideRenderer::new().with_extra_css(css),
        None => BasicSlideRenderer::new(),
    };
    let rendered = renderer.render(slide_markdown);
    if rendered.slide_count == 0 {
        return Err(DeckError::NothingToRender);
    }
    stages.done(ExportStage::Render, &format!("{} slides", rendered.slide_count));
    Ok((wrap_document(&rendered.html, &rendered.css), rendered.slide_count))
}

async fn capture_document<H: RenderHost>(
    host: &H,
    html: &str,
    config: &ExportConfig,
    stages: &Stages<'_>,
) -> Result<(Vec<u8>, u64), DeckError> {
    let options = CaptureOptions {
        load_timeout: config.load_timeout_secs.map(Duration::from_secs),
        ..Default::default()
    };
    let start = Instant::now();
    let pdf = stages.check(
        ExportStage::Capture,
        capture_pdf(host, html, &options).await.map_err(DeckError::from),
    )?;
    let capture_ms = millis(start);
    stages.done(ExportStage::Capture, &format!("{} bytes", pdf.len()));
    Ok((pdf, capture_ms))
}

async fn save(
    pdf: &[u8],
    title: &str,
    slide_count: usize,
    capture_ms: u64,
    sink: &dyn ArtifactSink,
    stages: &Stages<'_>,
) -> Result<SavedDeck, DeckError> {
    stages.start(ExportStage::Save);
    let path = stages.check(ExportStage::Save, sink.persist(pdf, &pdf_filename(title)).await)?;
    stages.done(ExportStage::Save, &path.display().to_string());
    Ok(SavedDeck {
        path,
        pdf_len: pdf.len(),
        slide_count,
        capture_ms,
    })
}

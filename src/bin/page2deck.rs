//! CLI binary for page2deck.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExportConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use page2deck::{
    export_page, markdown_to_pdf, page_markdown, ExportConfig, ExportProgressCallback,
    ExportStage, FileSink, SaveConfirmer, SaveDecision,
};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner whose prefix follows the current
/// stage, plus a log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|s| *s)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: ExportStage) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_prefix(stage.label());
        self.bar.set_message("");
    }

    fn on_stage_complete(&self, stage: ExportStage, detail: &str) {
        self.bar.println(format!(
            "  {} {:<30} {:<24} {}",
            green("✓"),
            stage.label(),
            dim(detail),
            self.elapsed()
        ));
    }

    fn on_stage_error(&self, stage: ExportStage, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<30} {}",
            red("✗"),
            stage.label(),
            red(&msg)
        ));
    }
}

// ── Save prompt ──────────────────────────────────────────────────────────────

/// Asks on the terminal before writing: Enter accepts, `n` cancels, anything
/// else is taken as a different path.
struct PromptConfirmer {
    bar: Option<ProgressBar>,
}

impl PromptConfirmer {
    fn ask(proposed: &Path) -> SaveDecision {
        eprint!(
            "{} Save to {}? [Y/n/other path] ",
            bold("?"),
            bold(&proposed.display().to_string())
        );
        io::stderr().flush().ok();

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return SaveDecision::Cancel;
        }
        parse_answer(&line)
    }
}

impl SaveConfirmer for PromptConfirmer {
    fn confirm(&self, proposed: &Path) -> SaveDecision {
        match &self.bar {
            Some(bar) => bar.suspend(|| Self::ask(proposed)),
            None => Self::ask(proposed),
        }
    }
}

fn parse_answer(line: &str) -> SaveDecision {
    match line.trim() {
        "" | "y" | "Y" | "yes" => SaveDecision::Accept,
        "n" | "N" | "no" => SaveDecision::Cancel,
        other => SaveDecision::Redirect(PathBuf::from(other)),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Export a page to ./<title>.pdf
  page2deck https://www.notion.so/Roadmap-0123456789abcdef0123456789abcdef

  # Into a directory, without the save prompt
  page2deck 0123456789abcdef0123456789abcdef -o decks/ --yes

  # Only print the page as Markdown (no LLM, no browser)
  page2deck --markdown-only 0123456789abcdef0123456789abcdef > page.md

  # Render hand-written slide Markdown (no Notion, no LLM)
  page2deck --from-markdown slides.md --title "Q3 Review"

  # Use an already running Chrome (chrome --remote-debugging-port=9222)
  page2deck --browser-url http://127.0.0.1:9222 <PAGE>

  # Reshape with another provider via edgequake-llm
  page2deck --provider anthropic --model claude-sonnet-4-20250514 <PAGE>

ENVIRONMENT VARIABLES:
  NOTION_TOKEN             Notion integration token (required to read pages)
  OPENAI_API_KEY           Key for the Responses API reshaper
  PAGE2DECK_MODEL          Override model ID (default: gpt-5-mini)
  PAGE2DECK_PROVIDER       Reshape through an edgequake-llm provider instead
  PAGE2DECK_BROWSER_URL    DevTools endpoint of a running browser
  CHROME_PATH              Chrome/Chromium executable to launch

SETUP:
  1. Share the page with your Notion integration.
  2. export NOTION_TOKEN=secret_... OPENAI_API_KEY=sk-...
  3. page2deck <PAGE>

  Chrome or Chromium must be installed (or reachable via --browser-url).
"#;

/// Turn a Notion page into a slide-deck PDF.
#[derive(Parser, Debug)]
#[command(
    name = "page2deck",
    version,
    about = "Turn a Notion page into a slide-deck PDF",
    long_about = "Retrieve a Notion page, convert its blocks to Markdown, have an LLM reshape \
it into Marp-style slides, and print the slides to PDF with headless Chrome.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page id, dashed UUID, or Notion page URL.
    #[arg(required_unless_present = "from_markdown")]
    page: Option<String>,

    /// Directory to write the PDF into.
    #[arg(short, long, env = "PAGE2DECK_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Deck title (and file name). Defaults to the page title.
    #[arg(long)]
    title: Option<String>,

    /// Notion integration token.
    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
    notion_token: Option<String>,

    /// API key for the Responses reshaper.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "PAGE2DECK_MODEL")]
    model: Option<String>,

    /// Reshape through an edgequake-llm provider (openai, anthropic, gemini, ollama, …).
    #[arg(long, env = "PAGE2DECK_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom reshape prompt.
    #[arg(long, env = "PAGE2DECK_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Path to a CSS file appended to the slide stylesheet.
    #[arg(long)]
    css: Option<PathBuf>,

    /// Print the page as Markdown and stop.
    #[arg(long, conflicts_with = "from_markdown")]
    markdown_only: bool,

    /// Skip Notion and the LLM: render this slide Markdown file.
    #[arg(long, value_name = "FILE")]
    from_markdown: Option<PathBuf>,

    /// DevTools endpoint of a running browser (http:// or ws://).
    #[arg(long, env = "PAGE2DECK_BROWSER_URL")]
    browser_url: Option<String>,

    /// Chrome/Chromium executable to launch. Ignored when --browser-url is given.
    #[arg(long, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,

    /// Give up if the slides have not loaded after this many seconds.
    #[arg(long, env = "PAGE2DECK_LOAD_TIMEOUT")]
    load_timeout: Option<u64>,

    /// Stop after this many blocks instead of retrieving the whole page.
    #[arg(long, env = "PAGE2DECK_MAX_BLOCKS")]
    max_blocks: Option<usize>,

    /// LLM request timeout in seconds.
    #[arg(long, env = "PAGE2DECK_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Save without asking.
    #[arg(short, long)]
    yes: bool,

    /// Disable progress spinner.
    #[arg(long, env = "PAGE2DECK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGE2DECK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGE2DECK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; verbose mode always wants them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.markdown_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone()).await?;

    let confirmer = PromptConfirmer {
        bar: progress.as_ref().map(|p| p.bar.clone()),
    };
    let sink = if cli.yes || !io::stdin().is_terminal() {
        FileSink::new(&cli.output_dir)
    } else {
        FileSink::new(&cli.output_dir).with_confirmer(Arc::new(confirmer))
    };

    let result = run(&cli, &config, &sink).await;
    if let Some(p) = &progress {
        p.finish();
    }
    result
}

async fn run(cli: &Cli, config: &ExportConfig, sink: &FileSink) -> Result<()> {
    // ── Slide Markdown from disk ─────────────────────────────────────────
    if let Some(ref path) = cli.from_markdown {
        let slides = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read slide Markdown from {:?}", path))?;
        let title = cli.title.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "slides".to_string())
        });
        let saved = markdown_to_pdf(&slides, &title, config, sink)
            .await
            .context("Export failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} slides  {}ms  →  {}",
                green("✔"),
                saved.slide_count,
                saved.capture_ms,
                bold(&saved.path.display().to_string())
            );
        }
        return Ok(());
    }

    // `page` is required unless --from-markdown was given.
    let page = cli.page.as_deref().context("PAGE is required")?;

    // ── Markdown-only mode ───────────────────────────────────────────────
    if cli.markdown_only {
        let doc = page_markdown(page, config)
            .await
            .context("Failed to retrieve page")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(doc.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !doc.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
        if !cli.quiet {
            eprintln!("{}", dim(&format!("{} ({} blocks)", doc.title, doc.block_count)));
        }
        return Ok(());
    }

    // ── Full export ──────────────────────────────────────────────────────
    let output = export_page(page, config, sink)
        .await
        .context("Export failed")?;

    if !cli.quiet {
        let s = &output.stats;
        eprintln!(
            "{}  {} blocks  →  {} slides  {}ms  →  {}",
            green("✔"),
            s.block_count,
            s.slide_count,
            s.total_ms,
            bold(&output.path.display().to_string()),
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "retrieve {}ms / reshape {}ms / capture {}ms  —  {} bytes",
                s.retrieve_ms, s.reshape_ms, s.capture_ms, s.pdf_bytes
            ))
        );
    }
    Ok(())
}

/// Map CLI args to `ExportConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<ExportConfig> {
    let mut builder = ExportConfig::builder().api_timeout_secs(cli.api_timeout);

    if let Some(ref token) = cli.notion_token {
        builder = builder.document_token(token);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.reshaper_key(key);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref path) = cli.css {
        let css = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read CSS from {:?}", path))?;
        builder = builder.extra_css(css);
    }
    if let Some(ref url) = cli.browser_url {
        builder = builder.browser_endpoint(url);
    } else if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome.clone());
    }
    if let Some(secs) = cli.load_timeout {
        builder = builder.load_timeout_secs(secs);
    }
    if let Some(n) = cli.max_blocks {
        builder = builder.max_blocks(n);
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb as Arc<dyn ExportProgressCallback>);
    }

    builder.build().context("Invalid configuration")
}

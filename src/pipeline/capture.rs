//! Capture orchestration: HTML document → PDF bytes via a debugging protocol.
//!
//! ## Lifecycle
//!
//! ```text
//! created ──▶ loaded ──▶ attached ──▶ printed ──▶ disposed
//!    │           │           │            │           ▲
//!    └───────────┴───────────┴────────────┴── failure ┘
//! ```
//!
//! One [`CaptureSession`] owns one rendering surface for its whole life.
//! Every exit path, success or failure at any stage, goes through
//! [`CaptureSession::release`], which detaches an open debugging session and
//! disposes the surface, each at most once. [`capture_pdf`] is the only
//! caller that needs to know this; it runs the forward transitions and then
//! releases unconditionally before reporting the outcome.
//!
//! The load wait is the one unbounded suspension point. A bound can be set
//! through [`CaptureOptions::load_timeout`]; when it fires, the pending wait
//! is dropped (which unregisters its event listener) and release still runs.
//!
//! The seams ([`RenderHost`], [`RenderSurface`], [`DebugSession`]) are async
//! traits so the orchestrator can be exercised without a browser; the
//! DevTools implementation lives in [`crate::cdp`].

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{CaptureError, CaptureStage};

/// Characters that are illegal in file names on at least one common filesystem.
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Upper bound on a sanitized file name, in characters.
pub const MAX_FILENAME_CHARS: usize = 180;

/// Fallback stem when a title sanitizes to nothing.
const DEFAULT_STEM: &str = "slides";

// ── Seams ────────────────────────────────────────────────────────────────

/// Creates rendering surfaces.
#[async_trait]
pub trait RenderHost: Send + Sync {
    type Surface: RenderSurface;

    /// Create a surface and start loading `url` into it.
    async fn create_surface(&self, url: &str) -> Result<Self::Surface, CaptureError>;
}

/// One off-screen page.
#[async_trait]
pub trait RenderSurface: Send {
    type Session: DebugSession;

    /// Resolve once the surface reports load completion.
    async fn wait_loaded(&mut self) -> Result<(), CaptureError>;

    /// Open a debugging session. May be rejected, e.g. if one is already open.
    async fn attach(&mut self) -> Result<Self::Session, CaptureError>;

    /// Release the surface.
    async fn dispose(self) -> Result<(), CaptureError>;
}

/// A debugging-protocol session attached to one surface.
#[async_trait]
pub trait DebugSession: Send {
    /// Issue one protocol command and await its result.
    async fn send(&mut self, method: &str, params: Value) -> Result<Value, CaptureError>;

    /// Close the session.
    async fn detach(self) -> Result<(), CaptureError>;
}

// ── Session ──────────────────────────────────────────────────────────────

/// Where a [`CaptureSession`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Loaded,
    Attached,
    Printed,
    Disposed,
}

/// `Page.printToPDF` parameters the pipeline cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintOptions {
    /// Print CSS backgrounds. Default: `true`.
    pub print_background: bool,
    /// Honour `@page { size }` from the document. Default: `true`.
    pub prefer_css_page_size: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            print_background: true,
            prefer_css_page_size: true,
        }
    }
}

impl PrintOptions {
    fn to_params(self) -> Value {
        json!({
            "printBackground": self.print_background,
            "preferCSSPageSize": self.prefer_css_page_size,
        })
    }
}

/// Options for [`capture_pdf`].
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub print: PrintOptions,
    /// Bound on the load wait. `None` waits indefinitely.
    pub load_timeout: Option<Duration>,
}

/// One rendering surface plus, while attached, its debugging session.
pub struct CaptureSession<S: RenderSurface> {
    surface: Option<S>,
    debug: Option<S::Session>,
    state: LifecycleState,
}

impl<S: RenderSurface> CaptureSession<S> {
    /// `→ created`: ask the host for a surface loading `url`.
    pub async fn create<H>(host: &H, url: &str) -> Result<Self, CaptureError>
    where
        H: RenderHost<Surface = S>,
    {
        let surface = host.create_surface(url).await?;
        debug!("Capture surface created");
        Ok(Self {
            surface: Some(surface),
            debug: None,
            state: LifecycleState::Created,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn debug_session_open(&self) -> bool {
        self.debug.is_some()
    }

    fn surface_mut(&mut self, stage: CaptureStage) -> Result<&mut S, CaptureError> {
        self.surface
            .as_mut()
            .ok_or_else(|| CaptureError::new(stage, "surface already released"))
    }

    /// `created → loaded`.
    pub async fn wait_loaded(&mut self, timeout: Option<Duration>) -> Result<(), CaptureError> {
        let surface = self.surface_mut(CaptureStage::Load)?;
        match timeout {
            None => surface.wait_loaded().await?,
            Some(limit) => tokio::time::timeout(limit, surface.wait_loaded())
                .await
                .map_err(|_| CaptureError::LoadTimeout {
                    secs: limit.as_secs(),
                })??,
        }
        self.state = LifecycleState::Loaded;
        debug!("Capture surface loaded");
        Ok(())
    }

    /// `loaded → attached`.
    pub async fn attach(&mut self) -> Result<(), CaptureError> {
        if self.debug.is_some() {
            return Err(CaptureError::new(
                CaptureStage::Attach,
                "a debugging session is already open",
            ));
        }
        let session = self.surface_mut(CaptureStage::Attach)?.attach().await?;
        self.debug = Some(session);
        self.state = LifecycleState::Attached;
        debug!("Debugging session attached");
        Ok(())
    }

    /// `attached → printed`: one paginated print, returning the PDF bytes.
    pub async fn print(&mut self, options: PrintOptions) -> Result<Vec<u8>, CaptureError> {
        let session = self
            .debug
            .as_mut()
            .ok_or_else(|| CaptureError::new(CaptureStage::Print, "no debugging session"))?;

        session.send("Page.enable", json!({})).await?;
        let result = session
            .send("Page.printToPDF", options.to_params())
            .await?;

        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| CaptureError::new(CaptureStage::Decode, "response has no 'data' field"))?;
        let pdf = STANDARD
            .decode(data)
            .map_err(|e| CaptureError::new(CaptureStage::Decode, format!("invalid base64: {e}")))?;

        self.state = LifecycleState::Printed;
        debug!("Printed {} PDF bytes", pdf.len());
        Ok(pdf)
    }

    /// `→ disposed`. Idempotent; runs both steps even if the first fails and
    /// reports the first failure.
    pub async fn release(&mut self) -> Result<(), CaptureError> {
        let mut first_err = None;

        if let Some(session) = self.debug.take() {
            if let Err(e) = session.detach().await {
                warn!("Detaching debugging session failed: {}", e);
                first_err = Some(e);
            }
        }
        if let Some(surface) = self.surface.take() {
            if let Err(e) = surface.dispose().await {
                warn!("Disposing capture surface failed: {}", e);
                first_err.get_or_insert(e);
            }
        }

        self.state = LifecycleState::Disposed;
        first_err.map_or(Ok(()), Err)
    }
}

impl<S: RenderSurface> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        if self.surface.is_some() || self.debug.is_some() {
            warn!("Capture session dropped before release (state: {:?})", self.state);
        }
    }
}

// ── Orchestration ────────────────────────────────────────────────────────

/// Wrap an HTML document in a self-contained `data:` URL.
pub fn html_data_url(html: &str) -> String {
    format!("data:text/html;charset=utf-8;base64,{}", STANDARD.encode(html.as_bytes()))
}

/// Render `html` on a fresh surface and return the PDF bytes.
///
/// The surface is released before this returns, whatever happened. When
/// both a transition and the release fail, the transition's error is
/// returned and the release error is logged.
pub async fn capture_pdf<H: RenderHost>(
    host: &H,
    html: &str,
    options: &CaptureOptions,
) -> Result<Vec<u8>, CaptureError> {
    let url = html_data_url(html);
    info!("Capturing PDF ({} bytes of HTML)", html.len());

    let mut session = CaptureSession::create(host, &url).await?;
    let outcome = drive(&mut session, options).await;
    let released = session.release().await;

    match (outcome, released) {
        (Ok(pdf), Ok(())) => Ok(pdf),
        (Ok(pdf), Err(e)) => {
            // The bytes are complete; a failed teardown does not invalidate them.
            warn!("PDF captured but release reported: {}", e);
            Ok(pdf)
        }
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!("Release after failed capture also failed: {}", release_err);
            Err(e)
        }
    }
}

async fn drive<S: RenderSurface>(
    session: &mut CaptureSession<S>,
    options: &CaptureOptions,
) -> Result<Vec<u8>, CaptureError> {
    session.wait_loaded(options.load_timeout).await?;
    session.attach().await?;
    session.print(options.print).await
}

// ── File names ───────────────────────────────────────────────────────────

/// Make `title` safe as a file-name stem on common filesystems.
///
/// Each of `<>:"/\|?*` and every C0 control character becomes `-`; the result
/// is cut to [`MAX_FILENAME_CHARS`] characters. A blank result becomes
/// `slides`.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) || c <= '\u{1f}' {
                '-'
            } else {
                c
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    if cleaned.trim().is_empty() {
        DEFAULT_STEM.to_string()
    } else {
        cleaned
    }
}

/// `<sanitized title>.pdf`.
pub fn pdf_filename(title: &str) -> String {
    format!("{}.pdf", sanitize_filename(title))
}

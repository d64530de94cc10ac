//! DevTools-backed rendering host, surface and debugging session.
//!
//! A surface is one browser target created blank, attached through a private
//! "loader" session, and navigated to the document URL. The load wait
//! listens for `Page.lifecycleEvent { name: "load" }` carrying the
//! `loaderId` returned by `Page.navigate`. The listener is registered before
//! navigating so a fast load cannot slip past.
//!
//! [`RenderSurface::attach`] opens a second, independent session on the same
//! target; that is the session printing goes through.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrome_auto::{ChromeProcess, LaunchOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::connection::{CdpConnection, EventSubscription};
use super::CdpError;
use crate::error::{CaptureError, CaptureStage};
use crate::pipeline::capture::{DebugSession, RenderHost, RenderSurface};

/// How to obtain a browser for capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BrowserSource {
    /// Start a private Chrome/Chromium process for this export.
    Launch {
        /// Explicit binary; discovered automatically when `None`.
        executable: Option<PathBuf>,
        headless: bool,
    },
    /// Use an already-running browser.
    ///
    /// `endpoint` is either a `ws://…/devtools/browser/…` URL or the
    /// `http://host:port` base of its remote-debugging server.
    Connect { endpoint: String },
}

impl Default for BrowserSource {
    fn default() -> Self {
        BrowserSource::Launch {
            executable: None,
            headless: true,
        }
    }
}

fn launch_err(e: impl std::fmt::Display) -> CaptureError {
    CaptureError::new(CaptureStage::Launch, e.to_string())
}

/// A browser plus the connection to it.
pub struct CdpHost {
    conn: Arc<CdpConnection>,
    process: Option<ChromeProcess>,
}

impl CdpHost {
    /// Launch or connect according to `source`.
    pub async fn open(source: &BrowserSource) -> Result<Self, CaptureError> {
        match source {
            BrowserSource::Launch {
                executable,
                headless,
            } => {
                let options = LaunchOptions {
                    executable: executable.clone(),
                    headless: *headless,
                    ..Default::default()
                };
                Self::launch(&options).await
            }
            BrowserSource::Connect { endpoint } => Self::connect(endpoint).await,
        }
    }

    /// Start a private browser and connect to it.
    pub async fn launch(options: &LaunchOptions) -> Result<Self, CaptureError> {
        let process = chrome_auto::launch(options).await.map_err(launch_err)?;
        info!("Launched browser {}", process.executable().display());

        let conn = match CdpConnection::connect(process.ws_url()).await {
            Ok(conn) => conn,
            Err(e) => {
                process.shutdown().await;
                return Err(launch_err(e));
            }
        };
        Ok(Self {
            conn: Arc::new(conn),
            process: Some(process),
        })
    }

    /// Connect to a running browser by WebSocket or HTTP endpoint.
    pub async fn connect(endpoint: &str) -> Result<Self, CaptureError> {
        let ws_url = resolve_ws_endpoint(endpoint).await.map_err(launch_err)?;
        let conn = CdpConnection::connect(&ws_url).await.map_err(launch_err)?;
        info!("Connected to browser at {}", ws_url);
        Ok(Self {
            conn: Arc::new(conn),
            process: None,
        })
    }

    /// Close the connection; a launched browser is terminated.
    pub async fn shutdown(self) {
        if let Some(process) = self.process {
            if let Err(e) = self.conn.send("Browser.close", json!({}), None).await {
                debug!("Browser.close: {}", e);
            }
            self.conn.close().await;
            process.shutdown().await;
        } else {
            self.conn.close().await;
        }
    }
}

/// Turn an `http://host:port` endpoint into its browser WebSocket URL via
/// `/json/version`. WebSocket URLs pass through unchanged.
pub async fn resolve_ws_endpoint(endpoint: &str) -> Result<String, CdpError> {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(CdpError::Discovery(format!(
            "'{endpoint}' is neither a ws:// nor an http:// URL"
        )));
    }

    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| CdpError::Discovery(e.to_string()))?;
    let version: Value = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| CdpError::Discovery(format!("{url}: {e}")))?
        .json()
        .await
        .map_err(|e| CdpError::Discovery(format!("{url}: {e}")))?;

    version
        .get("webSocketDebuggerUrl")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CdpError::Discovery(format!("{url} has no webSocketDebuggerUrl")))
}

fn str_field(value: &Value, field: &str) -> Result<String, CdpError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CdpError::Unexpected(format!("missing '{field}'")))
}

#[async_trait]
impl RenderHost for CdpHost {
    type Surface = CdpSurface;

    async fn create_surface(&self, url: &str) -> Result<CdpSurface, CaptureError> {
        let create_err = |e: CdpError| CaptureError::new(CaptureStage::Create, e.to_string());

        let created = self
            .conn
            .send("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await
            .map_err(create_err)?;
        let target_id = str_field(&created, "targetId").map_err(create_err)?;
        debug!("Created target {}", target_id);

        let mut surface = CdpSurface {
            conn: Arc::clone(&self.conn),
            target_id,
            loader_session: None,
            load_events: None,
            loader_id: None,
            debugger_attached: Arc::new(AtomicBool::new(false)),
            disposed: false,
        };

        if let Err(e) = surface.navigate(url).await {
            if let Err(close_err) = surface.close().await {
                warn!("Closing half-created surface: {}", close_err);
            }
            return Err(create_err(e));
        }
        Ok(surface)
    }
}

/// One browser target.
pub struct CdpSurface {
    conn: Arc<CdpConnection>,
    target_id: String,
    loader_session: Option<String>,
    load_events: Option<EventSubscription>,
    loader_id: Option<String>,
    debugger_attached: Arc<AtomicBool>,
    disposed: bool,
}

impl CdpSurface {
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    async fn navigate(&mut self, url: &str) -> Result<(), CdpError> {
        let attached = self
            .conn
            .send(
                "Target.attachToTarget",
                json!({ "targetId": self.target_id, "flatten": true }),
                None,
            )
            .await?;
        let session = str_field(&attached, "sessionId")?;
        self.loader_session = Some(session.clone());

        self.conn.send("Page.enable", json!({}), Some(&session)).await?;
        self.conn
            .send(
                "Page.setLifecycleEventsEnabled",
                json!({ "enabled": true }),
                Some(&session),
            )
            .await?;

        let events = self.conn.subscribe("Page.lifecycleEvent", Some(&session));
        let navigated = self
            .conn
            .send("Page.navigate", json!({ "url": url }), Some(&session))
            .await?;
        if let Some(error_text) = navigated.get("errorText").and_then(Value::as_str) {
            if !error_text.is_empty() {
                return Err(CdpError::Unexpected(format!("navigation failed: {error_text}")));
            }
        }

        self.loader_id = navigated
            .get("loaderId")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.load_events = Some(events);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CdpError> {
        self.disposed = true;
        self.load_events = None;
        if let Some(session) = self.loader_session.take() {
            if let Err(e) = self
                .conn
                .send("Target.detachFromTarget", json!({ "sessionId": session }), None)
                .await
            {
                debug!("Detaching loader session: {}", e);
            }
        }
        self.conn
            .send(
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
                None,
            )
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RenderSurface for CdpSurface {
    type Session = CdpSession;

    async fn wait_loaded(&mut self) -> Result<(), CaptureError> {
        let mut events = self
            .load_events
            .take()
            .ok_or_else(|| CaptureError::new(CaptureStage::Load, "surface is not loading"))?;

        while let Some(event) = events.next().await {
            if event.get("name").and_then(Value::as_str) != Some("load") {
                continue;
            }
            let matches_loader = match &self.loader_id {
                Some(expected) => event.get("loaderId").and_then(Value::as_str) == Some(expected),
                None => true,
            };
            if matches_loader {
                return Ok(());
            }
        }
        Err(CaptureError::new(
            CaptureStage::Load,
            "browser connection closed before the document loaded",
        ))
    }

    async fn attach(&mut self) -> Result<CdpSession, CaptureError> {
        if self.debugger_attached.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::new(
                CaptureStage::Attach,
                "a debugging session is already attached to this surface",
            ));
        }

        let attached = self
            .conn
            .send(
                "Target.attachToTarget",
                json!({ "targetId": self.target_id, "flatten": true }),
                None,
            )
            .await
            .and_then(|v| str_field(&v, "sessionId"));

        match attached {
            Ok(session_id) => Ok(CdpSession {
                conn: Arc::clone(&self.conn),
                session_id,
                attached: Arc::clone(&self.debugger_attached),
                detached: false,
            }),
            Err(e) => {
                self.debugger_attached.store(false, Ordering::SeqCst);
                Err(CaptureError::new(CaptureStage::Attach, e.to_string()))
            }
        }
    }

    async fn dispose(mut self) -> Result<(), CaptureError> {
        debug!("Closing target {}", self.target_id);
        self.close()
            .await
            .map_err(|e| CaptureError::new(CaptureStage::Release, e.to_string()))
    }
}

impl Drop for CdpSurface {
    fn drop(&mut self) {
        if self.disposed || self.conn.is_closed() {
            return;
        }
        // Best effort: the target would otherwise outlive this export.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let conn = Arc::clone(&self.conn);
            let target_id = std::mem::take(&mut self.target_id);
            handle.spawn(async move {
                let _ = conn
                    .send("Target.closeTarget", json!({ "targetId": target_id }), None)
                    .await;
            });
        }
    }
}

/// A flattened debugging session on one target.
pub struct CdpSession {
    conn: Arc<CdpConnection>,
    session_id: String,
    attached: Arc<AtomicBool>,
    detached: bool,
}

impl CdpSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl DebugSession for CdpSession {
    async fn send(&mut self, method: &str, params: Value) -> Result<Value, CaptureError> {
        self.conn
            .send(method, params, Some(&self.session_id))
            .await
            .map_err(|e| CaptureError::new(CaptureStage::Print, e.to_string()))
    }

    async fn detach(mut self) -> Result<(), CaptureError> {
        self.detached = true;
        self.attached.store(false, Ordering::SeqCst);
        self.conn
            .send(
                "Target.detachFromTarget",
                json!({ "sessionId": self.session_id }),
                None,
            )
            .await
            .map(|_| ())
            .map_err(|e| CaptureError::new(CaptureStage::Release, e.to_string()))
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        self.attached.store(false, Ordering::SeqCst);
        if self.conn.is_closed() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let conn = Arc::clone(&self.conn);
            let session_id = std::mem::take(&mut self.session_id);
            handle.spawn(async move {
                let _ = conn
                    .send("Target.detachFromTarget", json!({ "sessionId": session_id }), None)
                    .await;
            });
        }
    }
}

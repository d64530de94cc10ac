//! Render → capture → save against an in-process rendering host.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use page2deck::{
    markdown_to_pdf_with, CaptureError, CaptureStage, DebugSession, DeckError, ExportConfig,
    ExportProgressCallback, ExportStage, FileSink, RenderHost, RenderSurface, SaveConfirmer,
    SaveDecision,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const FAKE_PDF: &[u8] = b"%PDF-1.7\n% fake\n%%EOF\n";

#[derive(Default)]
struct Shared {
    fail_print: bool,
    urls: Mutex<Vec<String>>,
    methods: Mutex<Vec<String>>,
    detached: AtomicUsize,
    disposed: AtomicUsize,
}

struct Host(Arc<Shared>);
struct Surface(Arc<Shared>);
struct Session(Arc<Shared>);

#[async_trait]
impl RenderHost for Host {
    type Surface = Surface;

    async fn create_surface(&self, url: &str) -> Result<Surface, CaptureError> {
        self.0.urls.lock().unwrap().push(url.to_string());
        Ok(Surface(Arc::clone(&self.0)))
    }
}

#[async_trait]
impl RenderSurface for Surface {
    type Session = Session;

    async fn wait_loaded(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn attach(&mut self) -> Result<Session, CaptureError> {
        Ok(Session(Arc::clone(&self.0)))
    }

    async fn dispose(self) -> Result<(), CaptureError> {
        self.0.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DebugSession for Session {
    async fn send(&mut self, method: &str, _params: Value) -> Result<Value, CaptureError> {
        self.0.methods.lock().unwrap().push(method.to_string());
        match method {
            "Page.printToPDF" if self.0.fail_print => {
                Err(CaptureError::new(CaptureStage::Print, "Printing failed"))
            }
            "Page.printToPDF" => Ok(json!({ "data": STANDARD.encode(FAKE_PDF) })),
            _ => Ok(json!({})),
        }
    }

    async fn detach(self) -> Result<(), CaptureError> {
        self.0.detached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl ExportProgressCallback for Events {
    fn on_stage_start(&self, stage: ExportStage) {
        self.0.lock().unwrap().push(format!("start {stage}"));
    }

    fn on_stage_complete(&self, stage: ExportStage, _detail: &str) {
        self.0.lock().unwrap().push(format!("done {stage}"));
    }

    fn on_stage_error(&self, stage: ExportStage, _error: &str) {
        self.0.lock().unwrap().push(format!("fail {stage}"));
    }
}

struct Decline;

impl SaveConfirmer for Decline {
    fn confirm(&self, _proposed: &Path) -> SaveDecision {
        SaveDecision::Cancel
    }
}

fn config_with(events: &Arc<Events>) -> ExportConfig {
    ExportConfig::builder()
        .progress_callback(Arc::clone(events) as Arc<dyn ExportProgressCallback>)
        .build()
        .unwrap()
}

fn loaded_html(shared: &Shared) -> String {
    let urls = shared.urls.lock().unwrap();
    let encoded = urls[0]
        .strip_prefix("data:text/html;charset=utf-8;base64,")
        .expect("data URL");
    String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
}

#[tokio::test]
async fn slides_are_captured_and_saved_under_the_title() {
    let dir = tempfile::tempdir().unwrap();
    let shared = Arc::new(Shared::default());
    let events = Arc::new(Events::default());
    let config = config_with(&events);

    let saved = markdown_to_pdf_with(
        &Host(Arc::clone(&shared)),
        "---\nmarp: true\n---\n\n# Roadmap\n\n- now\n- later\n\n---\n\n# Risks ✓",
        "Q3: Plan/Review",
        &config,
        &FileSink::new(dir.path()),
    )
    .await
    .unwrap();

    assert_eq!(saved.slide_count, 2);
    assert_eq!(saved.pdf_len, FAKE_PDF.len());
    assert_eq!(saved.path, dir.path().join("Q3- Plan-Review.pdf"));
    assert_eq!(std::fs::read(&saved.path).unwrap(), FAKE_PDF);

    let html = loaded_html(&shared);
    assert!(html.contains("<h1>Roadmap</h1>"), "got: {html}");
    assert!(html.contains("Risks ✓"));
    assert!(!html.contains("marp: true"));

    assert_eq!(
        *shared.methods.lock().unwrap(),
        vec!["Page.enable", "Page.printToPDF"]
    );
    assert_eq!(shared.detached.load(Ordering::SeqCst), 1);
    assert_eq!(shared.disposed.load(Ordering::SeqCst), 1);

    assert_eq!(
        *events.0.lock().unwrap(),
        vec![
            "start render",
            "done render",
            "start capture",
            "done capture",
            "start save",
            "done save"
        ]
    );
}

#[tokio::test]
async fn print_failure_releases_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let shared = Arc::new(Shared {
        fail_print: true,
        ..Default::default()
    });
    let events = Arc::new(Events::default());
    let config = config_with(&events);

    let err = markdown_to_pdf_with(
        &Host(Arc::clone(&shared)),
        "# One",
        "deck",
        &config,
        &FileSink::new(dir.path()),
    )
    .await
    .unwrap_err();

    match err {
        DeckError::Capture(e) => assert_eq!(e.stage(), CaptureStage::Print),
        other => panic!("expected capture error, got {other:?}"),
    }
    assert_eq!(shared.detached.load(Ordering::SeqCst), 1);
    assert_eq!(shared.disposed.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(
        events.0.lock().unwrap().last().map(String::as_str),
        Some("fail capture")
    );
}

#[tokio::test]
async fn declined_save_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let shared = Arc::new(Shared::default());
    let events = Arc::new(Events::default());
    let config = config_with(&events);
    let sink = FileSink::new(dir.path()).with_confirmer(Arc::new(Decline));

    let err = markdown_to_pdf_with(&Host(Arc::clone(&shared)), "# One", "deck", &config, &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, DeckError::SaveCancelled), "got: {err:?}");
    // Capture already finished and released before the prompt.
    assert_eq!(shared.disposed.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(
        events.0.lock().unwrap().last().map(String::as_str),
        Some("fail save")
    );
}

#[tokio::test]
async fn empty_deck_never_reaches_the_host() {
    let dir = tempfile::tempdir().unwrap();
    let shared = Arc::new(Shared::default());
    let config = ExportConfig::default();

    let err = markdown_to_pdf_with(
        &Host(Arc::clone(&shared)),
        "---\ntheme: default\n---\n",
        "deck",
        &config,
        &FileSink::new(dir.path()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DeckError::NothingToRender), "got: {err:?}");
    assert!(shared.urls.lock().unwrap().is_empty());
}

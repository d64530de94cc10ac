//! Artifact sink: where finished PDFs go.
//!
//! [`FileSink`] writes into a directory after consulting a
//! [`SaveConfirmer`], which may accept the proposed path, redirect it, or
//! cancel the save. Writes are atomic: bytes land in a temporary file in the
//! destination directory and are renamed over the final path, so a reader
//! never observes a half-written PDF.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::DeckError;

/// Receives the PDF bytes and a suggested file name.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist `bytes`, returning where they ended up.
    async fn persist(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, DeckError>;
}

/// Outcome of a save prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveDecision {
    Accept,
    /// Save to this path instead.
    Redirect(PathBuf),
    Cancel,
}

/// Asks the user (or a policy) where to save.
///
/// Called synchronously, once per save.
pub trait SaveConfirmer: Send + Sync {
    fn confirm(&self, proposed: &Path) -> SaveDecision;
}

/// Accepts every proposed path.
pub struct AcceptAll;

impl SaveConfirmer for AcceptAll {
    fn confirm(&self, _proposed: &Path) -> SaveDecision {
        SaveDecision::Accept
    }
}

/// Writes artifacts into a directory.
#[derive(Clone)]
pub struct FileSink {
    dir: PathBuf,
    confirm: Arc<dyn SaveConfirmer>,
}

impl FileSink {
    /// Save into `dir` without prompting.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            confirm: Arc::new(AcceptAll),
        }
    }

    pub fn with_confirmer(mut self, confirm: Arc<dyn SaveConfirmer>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink").field("dir", &self.dir).finish()
    }
}

#[async_trait]
impl ArtifactSink for FileSink {
    async fn persist(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, DeckError> {
        let proposed = self.dir.join(filename);
        let path = match self.confirm.confirm(&proposed) {
            SaveDecision::Accept => proposed,
            SaveDecision::Redirect(other) => other,
            SaveDecision::Cancel => return Err(DeckError::SaveCancelled),
        };

        debug!("Writing {} bytes to {}", bytes.len(), path.display());
        let data = bytes.to_vec();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &data))
            .await
            .map_err(|e| DeckError::Internal(format!("write task failed: {e}")))??;

        info!("Saved {}", path.display());
        Ok(path)
    }
}

/// Temp file in the destination directory, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DeckError> {
    let write_err = |source: std::io::Error| DeckError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".page2deck-")
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Fixed(SaveDecision, Mutex<Vec<PathBuf>>);

    impl SaveConfirmer for Fixed {
        fn confirm(&self, proposed: &Path) -> SaveDecision {
            self.1.lock().unwrap().push(proposed.to_path_buf());
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let path = sink.persist(b"%PDF-1.7", "Deck.pdf").await.unwrap();

        assert_eq!(path, dir.path().join("Deck.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("a/b"));
        let path = sink.persist(b"x", "x.pdf").await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn overwrites_existing_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        sink.persist(b"old", "d.pdf").await.unwrap();
        sink.persist(b"new", "d.pdf").await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("d.pdf")).unwrap(), b"new");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1, "leftover files: {names:?}");
    }

    #[tokio::test]
    async fn confirmer_sees_proposed_path_and_can_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = dir.path().join("renamed.pdf");
        let confirm = Arc::new(Fixed(
            SaveDecision::Redirect(elsewhere.clone()),
            Mutex::new(Vec::new()),
        ));
        let sink = FileSink::new(dir.path()).with_confirmer(confirm.clone());

        let path = sink.persist(b"pdf", "original.pdf").await.unwrap();
        assert_eq!(path, elsewhere);
        assert_eq!(
            *confirm.1.lock().unwrap(),
            vec![dir.path().join("original.pdf")]
        );
        assert!(!dir.path().join("original.pdf").exists());
    }

    #[tokio::test]
    async fn cancel_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path())
            .with_confirmer(Arc::new(Fixed(SaveDecision::Cancel, Mutex::new(Vec::new()))));

        let err = sink.persist(b"pdf", "x.pdf").await.unwrap_err();
        assert!(matches!(err, DeckError::SaveCancelled));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

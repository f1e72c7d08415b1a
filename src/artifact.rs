//! Persisting finished images
//!
//! Images travel to the store as `data:` URLs, the same form a page or an
//! extension hands to a download API. The store answers with an opaque
//! [`ArtifactId`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine as Base64Engine;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque handle to a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOptions {
    /// Ask the user where to save instead of saving silently
    pub prompt_user: bool,
}

/// Storage collaborator
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn persist(&self, data_url: &str, filename: &str, options: PersistOptions) -> Result<ArtifactId>;
}

/// What kind of capture produced an artifact; decides its filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Page,
    Area,
}

/// `screenshot_<timestamp>.png` or `area-screenshot-<timestamp>.png`, with
/// a compact UTC ISO-8601 timestamp down to milliseconds.
pub fn timestamped_filename(kind: ArtifactKind) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    match kind {
        ArtifactKind::Page => format!("screenshot_{}.png", stamp),
        ArtifactKind::Area => format!("area-screenshot-{}.png", stamp),
    }
}

pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

/// Split a base64 `data:` URL into its media type and decoded bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::ArtifactPersist("not a data URL".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::ArtifactPersist("data URL has no payload".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::ArtifactPersist("only base64 data URLs are supported".into()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| Error::ArtifactPersist(format!("invalid base64 payload: {}", e)))?;
    Ok((mime.to_string(), bytes))
}

fn check_filename(filename: &str) -> Result<()> {
    let plain = Path::new(filename)
        .file_name()
        .map(|n| n == filename)
        .unwrap_or(false);
    if filename.is_empty() || !plain || filename.contains('\\') {
        return Err(Error::ArtifactPersist(format!("refusing filename {:?}", filename)));
    }
    Ok(())
}

/// Writes artifacts as files under a root directory
pub struct DirectoryStore {
    root: PathBuf,
    next_id: AtomicU64,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for DirectoryStore {
    async fn persist(&self, data_url: &str, filename: &str, options: PersistOptions) -> Result<ArtifactId> {
        check_filename(filename)?;
        let (_, bytes) = decode_data_url(data_url)?;
        if options.prompt_user {
            debug!("directory store cannot prompt; saving {} directly", filename);
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::ArtifactPersist(format!("create {}: {}", self.root.display(), e)))?;
        let path = self.root.join(filename);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| Error::ArtifactPersist(format!("write {}: {}", path.display(), e)))?;

        let id = ArtifactId(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!("saved {} ({} bytes) as artifact {}", path.display(), bytes.len(), id.0);
        Ok(id)
    }
}

/// An artifact held by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub id: ArtifactId,
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Keeps artifacts in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<StoredArtifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> Vec<StoredArtifact> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    pub fn get(&self, id: ArtifactId) -> Option<StoredArtifact> {
        self.artifacts().into_iter().find(|a| a.id == id)
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn persist(&self, data_url: &str, filename: &str, _options: PersistOptions) -> Result<ArtifactId> {
        check_filename(filename)?;
        let (mime, bytes) = decode_data_url(data_url)?;
        let mut items = self
            .items
            .lock()
            .map_err(|_| Error::ArtifactPersist("store lock poisoned".into()))?;
        let id = ArtifactId(items.len() as u64 + 1);
        items.push(StoredArtifact {
            id,
            filename: filename.to_string(),
            mime,
            bytes,
        });
        Ok(id)
    }
}

//! Duplicate image detection by content hash (SHA-256)

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Lowercase hex SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Digest -> first file known to hold that content
#[derive(Debug, Default)]
pub struct ContentIndex {
    seen: Mutex<HashMap<String, PathBuf>>,
}

impl ContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every regular file directly inside `dir`
    pub async fn scan_dir(dir: &Path) -> std::io::Result<Self> {
        let index = Self::new();
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let bytes = tokio::fs::read(&path).await?;
            index.claim(content_hash(&bytes), &path);
        }

        debug!(dir = %dir.display(), files = index.len(), "Indexed existing files");
        Ok(index)
    }

    /// Record `path` as the holder of `digest`
    ///
    /// Returns the earlier path when the content is already known; the index
    /// is left unchanged in that case.
    pub fn claim(&self, digest: String, path: &Path) -> Option<PathBuf> {
        let mut seen = self.seen();
        if let Some(first) = seen.get(&digest) {
            return Some(first.clone());
        }
        seen.insert(digest, path.to_path_buf());
        None
    }

    /// Drop a claim whose file never made it to disk
    pub fn forget(&self, digest: &str) {
        self.seen().remove(digest);
    }

    fn len(&self) -> usize {
        self.seen().len()
    }

    fn seen(&self) -> MutexGuard<'_, HashMap<String, PathBuf>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! `download` command: fetch the images a manifest points at

use crate::dedup::{content_hash, ContentIndex};
use anifetch_core::application::ConcurrencyLimiter;
use anifetch_infra_http::HttpFetcher;
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Tabled)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Downloaded,
    Skipped,
    Duplicate,
    Failed,
}

/// Download every `(url, path)` target, at most `limiter.limit()` at a time
///
/// Existing files are skipped. Bodies whose content is already in `index`
/// are not written. Failures are logged and counted.
pub async fn run_download(
    fetcher: Arc<HttpFetcher>,
    targets: Vec<(String, PathBuf)>,
    limiter: ConcurrencyLimiter,
    index: Arc<ContentIndex>,
) -> DownloadSummary {
    info!(
        count = targets.len(),
        concurrency = limiter.limit(),
        "Starting downloads"
    );

    let tasks = targets.into_iter().map(|(url, path)| {
        let fetcher = Arc::clone(&fetcher);
        let index = Arc::clone(&index);
        let limiter = limiter.clone();
        async move { limiter.run(download_one(&fetcher, &index, &url, &path)).await }
    });

    let mut summary = DownloadSummary::default();
    for outcome in join_all(tasks).await {
        match outcome {
            Outcome::Downloaded => summary.downloaded += 1,
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Duplicate => summary.duplicates += 1,
            Outcome::Failed => summary.failed += 1,
        }
    }

    info!(
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        duplicates = summary.duplicates,
        failed = summary.failed,
        "Downloads complete"
    );
    summary
}

async fn download_one(
    fetcher: &HttpFetcher,
    index: &ContentIndex,
    url: &str,
    path: &Path,
) -> Outcome {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(url, path = %path.display(), "Already downloaded");
        return Outcome::Skipped;
    }

    let bytes = match fetcher.get_bytes(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url, error = %e, "Download failed, skipping");
            return Outcome::Failed;
        }
    };

    let digest = content_hash(&bytes);
    if let Some(first) = index.claim(digest.clone(), path) {
        info!(url, duplicate_of = %first.display(), "Duplicate image, not saved");
        return Outcome::Duplicate;
    }

    match tokio::fs::write(path, &bytes).await {
        Ok(()) => {
            debug!(url, path = %path.display(), bytes = bytes.len(), "Saved");
            Outcome::Downloaded
        }
        Err(e) => {
            index.forget(&digest);
            warn!(url, path = %path.display(), error = %e, "Write failed, skipping");
            Outcome::Failed
        }
    }
}

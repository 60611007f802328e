// Upstream catalog and per-upstream clients
//
// Each third-party API gets its own queue with its own pacing. Payload
// shapes are the caller's business; this module only knows where the API
// lives and how fast it may be called.

use crate::fetcher::HttpFetcher;
use anifetch_core::application::RateLimitedQueue;
use anifetch_core::domain::{QueueConfig, RequestError};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default retry budget for every upstream
const DEFAULT_UPSTREAM_RETRIES: u32 = 3;

/// Third-party APIs the fetch scripts talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Upstream {
    #[serde(rename = "anilist")]
    AniList,
    Jikan,
    WaifuIm,
    WaifuPics,
    Nekos,
}

#[derive(Error, Debug)]
#[error("Unknown upstream '{0}' (expected one of: anilist, jikan, waifu_im, waifu_pics, nekos)")]
pub struct UnknownUpstream(String);

impl Upstream {
    pub const ALL: [Upstream; 5] = [
        Upstream::AniList,
        Upstream::Jikan,
        Upstream::WaifuIm,
        Upstream::WaifuPics,
        Upstream::Nekos,
    ];

    /// Stable key used for queue names and config sections
    pub fn key(&self) -> &'static str {
        match self {
            Upstream::AniList => "anilist",
            Upstream::Jikan => "jikan",
            Upstream::WaifuIm => "waifu_im",
            Upstream::WaifuPics => "waifu_pics",
            Upstream::Nekos => "nekos",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Upstream::AniList => "https://graphql.anilist.co",
            Upstream::Jikan => "https://api.jikan.moe/v4",
            Upstream::WaifuIm => "https://api.waifu.im",
            Upstream::WaifuPics => "https://api.waifu.pics",
            Upstream::Nekos => "https://nekos.best/api/v2",
        }
    }

    /// Minimum spacing between requests
    pub fn default_min_interval(&self) -> Duration {
        match self {
            // 90 req/min nominal, frequently degraded to 30 req/min
            Upstream::AniList => Duration::from_millis(2000),
            // 3 req/s and 60 req/min
            Upstream::Jikan => Duration::from_millis(1000),
            Upstream::WaifuIm | Upstream::WaifuPics | Upstream::Nekos => {
                Duration::from_millis(500)
            }
        }
    }

    pub fn default_queue_config(&self) -> QueueConfig {
        QueueConfig::new(
            self.key(),
            self.default_min_interval(),
            DEFAULT_UPSTREAM_RETRIES,
        )
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Upstream {
    type Err = UnknownUpstream;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '.'], "_");
        match normalized.as_str() {
            "anilist" => Ok(Upstream::AniList),
            "jikan" | "mal" => Ok(Upstream::Jikan),
            "waifu_im" | "waifuim" => Ok(Upstream::WaifuIm),
            "waifu_pics" | "waifupics" => Ok(Upstream::WaifuPics),
            "nekos" | "nekos_best" => Ok(Upstream::Nekos),
            _ => Err(UnknownUpstream(s.to_string())),
        }
    }
}

/// One upstream API: shared fetcher plus its own rate-limited queue
pub struct UpstreamClient {
    upstream: Upstream,
    base_url: String,
    fetcher: Arc<HttpFetcher>,
    queue: RateLimitedQueue,
}

impl UpstreamClient {
    pub fn new(
        upstream: Upstream,
        config: QueueConfig,
        fetcher: Arc<HttpFetcher>,
    ) -> anifetch_core::Result<Self> {
        Ok(Self {
            upstream,
            base_url: upstream.base_url().to_string(),
            fetcher,
            queue: RateLimitedQueue::new(config)?,
        })
    }

    /// Point the client at a mirror or a local test server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn upstream(&self) -> Upstream {
        self.upstream
    }

    pub fn queue(&self) -> &RateLimitedQueue {
        &self.queue
    }

    /// Absolute URL for `path`; absolute URLs pass through untouched
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Queue a GET of `path`; enqueued immediately, resolved when it settles
    pub fn get_json(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Value, RequestError>> + Send + 'static {
        let url = self.url_for(path);
        let fetcher = Arc::clone(&self.fetcher);

        self.queue.submit(move || {
            let fetcher = Arc::clone(&fetcher);
            let url = url.clone();
            async move { fetcher.get_json(&url).await }
        })
    }

    /// Queue a JSON POST (GraphQL) of `body` to `path`
    pub fn post_json(
        &self,
        path: &str,
        body: Value,
    ) -> impl Future<Output = Result<Value, RequestError>> + Send + 'static {
        let url = self.url_for(path);
        let fetcher = Arc::clone(&self.fetcher);
        let body = Arc::new(body);

        self.queue.submit(move || {
            let fetcher = Arc::clone(&fetcher);
            let url = url.clone();
            let body = Arc::clone(&body);
            async move { fetcher.post_json(&url, &body).await }
        })
    }
}

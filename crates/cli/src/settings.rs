//! Layered settings: defaults -> TOML file -> `ANIFETCH_*` environment

use anifetch_core::domain::QueueConfig;
use anifetch_infra_http::{FetcherConfig, Upstream};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "~/.anifetch/config.toml";
const ENV_PREFIX: &str = "ANIFETCH";
const DEFAULT_LOG_FORMAT: &str = "pretty";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DOWNLOAD_CONCURRENCY: u64 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// "json" for structured logs, anything else for pretty output
    pub log_format: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub download_concurrency: usize,
    /// Per-upstream queue overrides keyed by upstream key (e.g. `jikan`)
    #[serde(default)]
    pub queues: HashMap<String, QueueOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueOverride {
    pub min_interval_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub final_rate_limit_attempt: Option<bool>,
}

impl Settings {
    /// Load settings; an explicit `path` must exist, the default one may not
    pub fn load(path: Option<&str>) -> Result<Self> {
        let required = path.is_some();
        let path = PathBuf::from(shellexpand::tilde(path.unwrap_or(DEFAULT_CONFIG_PATH)).into_owned());

        let settings = Config::builder()
            .set_default("log_format", DEFAULT_LOG_FORMAT)?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            .set_default("user_agent", FetcherConfig::default().user_agent)?
            .set_default("download_concurrency", DEFAULT_DOWNLOAD_CONCURRENCY)?
            .add_source(File::from(path.as_path()).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Invalid configuration values")
    }

    /// Upstream defaults with any configured override applied
    pub fn queue_config(&self, upstream: Upstream) -> QueueConfig {
        let mut config = upstream.default_queue_config();

        if let Some(overrides) = self.queues.get(upstream.key()) {
            if let Some(ms) = overrides.min_interval_ms {
                config.min_interval = Duration::from_millis(ms);
            }
            if let Some(retries) = overrides.max_retries {
                config.max_retries = retries;
            }
            if let Some(enabled) = overrides.final_rate_limit_attempt {
                config.final_rate_limit_attempt = enabled;
            }
        }

        config
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.request_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

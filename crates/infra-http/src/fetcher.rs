// HTTP fetcher (reqwest adapter)
// Turns upstream responses into classifiable `RequestError`s
use anifetch_core::domain::retry_after::{retry_hint, RETRY_AFTER_HEADER, RETRY_AFTER_MS_HEADER};
use anifetch_core::domain::RequestError;
use anifetch_core::port::TimeProvider;
use anifetch_core::AppError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default request timeout (30s)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies are truncated to this many characters in messages
const MAX_ERROR_BODY_CHARS: usize = 200;

/// HTTP client settings
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: format!("anifetch/{}", anifetch_core::VERSION),
        }
    }
}

/// Thin reqwest wrapper shared by all upstream clients
pub struct HttpFetcher {
    client: Client,
    time_provider: Arc<dyn TimeProvider>,
}

impl HttpFetcher {
    /// Create a new fetcher
    ///
    /// # Arguments
    /// * `config` - Timeout and user agent
    /// * `time_provider` - Wall clock for HTTP-date `Retry-After` values
    pub fn new(
        config: &FetcherConfig,
        time_provider: Arc<dyn TimeProvider>,
    ) -> anifetch_core::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            time_provider,
        })
    }

    /// GET `url` and decode the body as JSON
    pub async fn get_json(&self, url: &str) -> Result<Value, RequestError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let response = self.check_status(response).await?;
        response.json::<Value>().await.map_err(transport_error)
    }

    /// POST `body` as JSON to `url` and decode the response as JSON
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RequestError> {
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = self.check_status(response).await?;
        response.json::<Value>().await.map_err(transport_error)
    }

    /// GET `url` and return the raw body (image downloads)
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, RequestError> {
        debug!(url = %url, "GET (bytes)");
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let response = self.check_status(response).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn check_status(&self, response: Response) -> Result<Response, RequestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = retry_hint(
            header_str(response.headers(), RETRY_AFTER_MS_HEADER),
            header_str(response.headers(), RETRY_AFTER_HEADER),
            self.time_provider.now_millis(),
        );

        // Body is best effort: the status alone is enough to classify
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body, status.canonical_reason());

        debug!(
            status = status.as_u16(),
            retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
            "Upstream returned error status"
        );

        Err(RequestError::Status {
            status: status.as_u16(),
            message,
            retry_after,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Body snippet if there is one, otherwise the canonical reason phrase
fn error_message(body: &str, reason: Option<&str>) -> String {
    let body = body.trim();
    if body.is_empty() {
        return reason.unwrap_or("Unknown status").to_string();
    }

    let mut snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        snippet.push_str("...");
    }
    snippet
}

/// Map a reqwest failure onto the queue's error taxonomy
pub fn transport_error(err: reqwest::Error) -> RequestError {
    if err.is_decode() {
        return RequestError::Decode(err.to_string());
    }

    if let Some(status) = err.status() {
        return RequestError::status(status.as_u16(), err.to_string());
    }

    let error = RequestError::transport(err.to_string());
    if err.is_timeout() {
        error.with_code("TIMEOUT")
    } else if err.is_connect() {
        error.with_code("CONNECT")
    } else {
        error
    }
}

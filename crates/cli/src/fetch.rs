//! `fetch` command: one queued request per id, results into a manifest

use crate::manifest::{FailedEntry, Manifest, ManifestEntry};
use anifetch_infra_http::UpstreamClient;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::future::{join_all, Either};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info, warn};

const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Path template relative to the upstream base URL, `{id}` is substituted
    pub path: String,
    /// GraphQL document; when set every id is POSTed as `{ query, variables: { id } }`
    pub graphql_query: Option<String>,
    pub ids: Vec<String>,
}

/// Submit every id at once and wait for all of them to settle
///
/// The upstream queue serializes the requests. Failed ids are logged and
/// recorded in the manifest's `failed` list, never returned as an error.
pub async fn run_fetch(client: &UpstreamClient, request: &FetchRequest) -> Manifest {
    let api = client.upstream().key();
    info!(api, count = request.ids.len(), "Submitting requests");

    // Collecting submits everything before the first await, in id order
    let pending: Vec<_> = request
        .ids
        .iter()
        .map(|id| {
            let path = expand_path(&request.path, id);
            let response = match &request.graphql_query {
                Some(query) => Either::Left(client.post_json(&path, graphql_body(query, id))),
                None => Either::Right(client.get_json(&path)),
            };
            let id = id.clone();
            async move { (id, response.await) }
        })
        .collect();

    debug!(snapshot = ?client.queue().snapshot(), "Queue after submission");

    let mut manifest = Manifest {
        api: api.to_string(),
        generated_at: Utc::now(),
        entries: Vec::new(),
        failed: Vec::new(),
    };

    for (id, result) in join_all(pending).await {
        match result {
            Ok(data) => manifest.entries.push(ManifestEntry { id, data }),
            Err(e) => {
                warn!(api, id = %id, error = %e, "Request failed, skipping");
                manifest.failed.push(FailedEntry {
                    id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        api,
        fetched = manifest.entries.len(),
        failed = manifest.failed.len(),
        "Fetch complete"
    );
    manifest
}

pub fn expand_path(template: &str, id: &str) -> String {
    template.replace(ID_PLACEHOLDER, id)
}

/// GraphQL request body; numeric ids are sent as numbers
pub fn graphql_body(query: &str, id: &str) -> Value {
    let id = id
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id));
    json!({
        "query": query,
        "variables": { "id": id },
    })
}

/// Split a comma or newline separated id list
///
/// Blank entries and `#` comment lines are ignored.
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Ids from `--ids` and/or `--ids-file`, in that order
pub async fn load_ids(ids: Option<&str>, ids_file: Option<&Path>) -> Result<Vec<String>> {
    let mut all = ids.map(parse_id_list).unwrap_or_default();

    if let Some(path) = ids_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read ids file {}", path.display()))?;
        all.extend(parse_id_list(&raw));
    }

    if all.is_empty() {
        bail!("No ids given (use --ids or --ids-file)");
    }
    Ok(all)
}

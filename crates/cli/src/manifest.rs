//! Fetch manifests: what a `fetch` run wrote and where `download` reads from

use anifetch_core::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub api: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
    #[serde(default)]
    pub failed: Vec<FailedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEntry {
    pub id: String,
    pub error: String,
}

pub async fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(manifest)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub async fn read_manifest(path: &Path) -> Result<Manifest> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// Every image URL found anywhere in the entries, first occurrence order
pub fn collect_image_urls(manifest: &Manifest) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for entry in &manifest.entries {
        walk(&entry.data, &mut |s| {
            if is_image_url(s) && seen.insert(s.to_string()) {
                urls.push(s.to_string());
            }
        });
    }
    urls
}

fn walk(value: &Value, visit: &mut dyn FnMut(&str)) {
    match value {
        Value::String(s) => visit(s),
        Value::Array(items) => items.iter().for_each(|v| walk(v, visit)),
        Value::Object(map) => map.values().for_each(|v| walk(v, visit)),
        _ => {}
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

pub fn is_image_url(s: &str) -> bool {
    if !(s.starts_with("http://") || s.starts_with("https://")) {
        return false;
    }
    let path = strip_query(s).to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Last path segment of `url`, sanitized for the local filesystem
pub fn file_name_for_url(url: &str) -> Option<String> {
    let name = strip_query(url).rsplit('/').next()?;
    if name.is_empty() {
        return None;
    }
    Some(
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    )
}

/// Map each URL to a unique file in `out_dir`
///
/// Same-named files from different URLs get a `-N` suffix before the
/// extension; URLs without a usable name are dropped.
pub fn plan_targets(urls: &[String], out_dir: &Path) -> Vec<(String, PathBuf)> {
    let mut used: HashMap<String, usize> = HashMap::new();
    let mut targets = Vec::with_capacity(urls.len());

    for url in urls {
        let Some(name) = file_name_for_url(url) else {
            continue;
        };
        let count = used.entry(name.clone()).or_insert(0);
        *count += 1;

        let unique = if *count == 1 {
            name
        } else {
            match name.rsplit_once('.') {
                Some((stem, ext)) => format!("{}-{}.{}", stem, count, ext),
                None => format!("{}-{}", name, count),
            }
        };
        targets.push((url.clone(), out_dir.join(unique)));
    }

    targets
}

//! anifetch CLI - batch fetcher for anime APIs
//!
//! Every upstream gets its own rate-limited queue; failed items are logged
//! and skipped, only setup errors end the process with a non-zero status.

mod dedup;
mod download;
mod fetch;
mod logging;
mod manifest;
mod settings;

use anifetch_core::application::ConcurrencyLimiter;
use anifetch_core::port::time_provider::SystemTimeProvider;
use anifetch_infra_http::{HttpFetcher, Upstream, UpstreamClient};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dedup::ContentIndex;
use fetch::FetchRequest;
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::info;

#[derive(Parser)]
#[command(name = "anifetch")]
#[command(about = "Rate-limited batch fetcher for anime APIs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.anifetch/config.toml)
    #[arg(long, global = true, env = "ANIFETCH_CONFIG")]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one resource per id through the upstream's queue
    Fetch {
        /// Upstream API (anilist, jikan, waifu_im, waifu_pics, nekos)
        #[arg(short, long)]
        api: Upstream,

        /// Path template, `{id}` is replaced by each id
        #[arg(short, long, default_value = "")]
        path: String,

        /// GraphQL query file; ids are sent as the `id` variable
        #[arg(long)]
        graphql: Option<PathBuf>,

        /// Comma separated ids
        #[arg(long)]
        ids: Option<String>,

        /// File with one id per line (`#` starts a comment)
        #[arg(long)]
        ids_file: Option<PathBuf>,

        /// Manifest output file
        #[arg(short, long)]
        out: PathBuf,

        /// Override the upstream base URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Download every image referenced by a manifest
    Download {
        /// Manifest written by `fetch`
        #[arg(short, long)]
        manifest: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Parallel downloads (default from config)
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Print the resolved configuration
    Config,
}

#[derive(Tabled)]
struct FetchSummary {
    api: String,
    requested: usize,
    fetched: usize,
    failed: usize,
    manifest: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    logging::init_logging(&settings.log_format)?;

    match cli.command {
        Commands::Fetch {
            api,
            path,
            graphql,
            ids,
            ids_file,
            out,
            base_url,
        } => {
            let graphql_query = match graphql {
                Some(file) => Some(
                    tokio::fs::read_to_string(&file)
                        .await
                        .with_context(|| format!("Failed to read GraphQL file {}", file.display()))?,
                ),
                None => None,
            };
            let ids = fetch::load_ids(ids.as_deref(), ids_file.as_deref()).await?;

            let fetcher = Arc::new(
                HttpFetcher::new(&settings.fetcher_config(), Arc::new(SystemTimeProvider))
                    .context("Failed to create HTTP client")?,
            );
            let mut client = UpstreamClient::new(api, settings.queue_config(api), fetcher)
                .context("Invalid queue configuration")?;
            if let Some(base_url) = base_url {
                client = client.with_base_url(base_url);
            }

            let request = FetchRequest {
                path,
                graphql_query,
                ids,
            };
            let manifest = fetch::run_fetch(&client, &request).await;

            manifest::write_manifest(&out, &manifest)
                .await
                .with_context(|| format!("Failed to write manifest {}", out.display()))?;
            info!(path = %out.display(), "Manifest written");

            if manifest.failed.is_empty() {
                println!("{}", "✓ All requests succeeded".green().bold());
            } else {
                println!(
                    "{}",
                    format!("⚠ {} request(s) failed", manifest.failed.len())
                        .yellow()
                        .bold()
                );
                for failed in &manifest.failed {
                    println!("  {} {}: {}", "✗".red(), failed.id, failed.error);
                }
            }
            println!();

            let summary = FetchSummary {
                api: api.to_string(),
                requested: request.ids.len(),
                fetched: manifest.entries.len(),
                failed: manifest.failed.len(),
                manifest: out.display().to_string(),
            };
            println!("{}", Table::new(vec![summary]));
        }

        Commands::Download {
            manifest: manifest_path,
            out,
            concurrency,
        } => {
            let manifest = manifest::read_manifest(&manifest_path)
                .await
                .with_context(|| format!("Failed to read manifest {}", manifest_path.display()))?;
            tokio::fs::create_dir_all(&out)
                .await
                .with_context(|| format!("Failed to create {}", out.display()))?;

            let index = ContentIndex::scan_dir(&out)
                .await
                .with_context(|| format!("Failed to index {}", out.display()))?;

            let urls = manifest::collect_image_urls(&manifest);
            let targets = manifest::plan_targets(&urls, &out);
            println!(
                "{}",
                format!("Downloading {} image(s) from {} manifest", targets.len(), manifest.api)
                    .cyan()
                    .bold()
            );

            let fetcher = Arc::new(
                HttpFetcher::new(&settings.fetcher_config(), Arc::new(SystemTimeProvider))
                    .context("Failed to create HTTP client")?,
            );
            let limiter =
                ConcurrencyLimiter::new(concurrency.unwrap_or(settings.download_concurrency));
            let summary = download::run_download(fetcher, targets, limiter, Arc::new(index)).await;

            if summary.failed == 0 {
                println!("{}", "✓ Downloads finished".green().bold());
            } else {
                println!(
                    "{}",
                    format!("⚠ {} download(s) failed", summary.failed).yellow().bold()
                );
            }
            if summary.duplicates > 0 {
                println!(
                    "{}",
                    format!("{} duplicate image(s) not saved", summary.duplicates).dimmed()
                );
            }
            println!();
            println!("{}", Table::new(vec![summary]));
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

// anifetch HTTP adapters
// reqwest lives here so the core crate stays transport-agnostic

pub mod fetcher;
pub mod upstream;

pub use fetcher::{transport_error, FetcherConfig, HttpFetcher};
pub use upstream::{UnknownUpstream, Upstream, UpstreamClient};

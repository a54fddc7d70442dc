//! Runtime pieces of the `mucca` binary: configuration, the HTTP metadata
//! fetcher and the change-feed enrichment worker.

pub mod config;
pub mod fetch;
pub mod worker;

pub use config::ServerConfig;
pub use fetch::HttpFetcher;
pub use worker::EnrichmentWorker;

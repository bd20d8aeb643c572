//! Catalog Crawler - bounded-concurrency product catalog fetcher
//!
//! Fetches product records by numeric ID from a catalog API, retries with
//! linear backoff, classifies every failure into a closed taxonomy and writes
//! one JSON artifact per batch.

// Module declarations
pub mod crawling;
pub mod domain;
pub mod infrastructure;

pub use crawling::{BatchRunner, CrawlError, Dispatcher, ItemFetcher, RunReport};
pub use domain::{ErrorKind, FetchOutcome, ItemId};

//! # Crawling Engine
//!
//! Bounded-concurrency fetch engine
//! - 명시적 모듈 구조 (mod.rs 비사용)
//! - `retry`: per-item retry policy and pacing seam
//! - `fetcher`: one item, one outcome
//! - `dispatcher`: many items under a semaphore
//! - `batch_runner`: sequential batches handed to a sink

pub mod batch_runner;
pub mod dispatcher;
pub mod fetcher;
pub mod retry;

pub use batch_runner::{BatchRunner, CrawlError, RunReport};
pub use dispatcher::{DispatchProgress, Dispatcher, ProgressCallback};
pub use fetcher::{FetcherSettings, ItemFetcher};
pub use retry::{Pacer, PauseKind, RetryDecision, RetryPolicy, RetryState, TokioPacer};

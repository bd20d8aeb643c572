//! 동시성 디스패처 - bounded concurrent item fetching
//!
//! Every ID becomes one spawned task that waits for a semaphore permit before
//! fetching, so at most `concurrency` fetches are in flight. Outcomes are
//! collected in completion order. A task that panics still yields an
//! `unknown_error` outcome for its ID.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info};

use super::fetcher::ItemFetcher;
use crate::domain::{ErrorKind, FetchFailure, FetchOutcome, ItemId};

/// Snapshot handed to the progress callback after each completed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchProgress {
    pub completed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub type ProgressCallback = Arc<dyn Fn(DispatchProgress) + Send + Sync>;

/// Runs item fetches against a fixed in-flight budget
#[derive(Clone)]
pub struct Dispatcher {
    concurrency: NonZeroUsize,
    progress: Option<ProgressCallback>,
    /// Log a progress line every this many completions
    log_every: usize,
}

impl Dispatcher {
    pub const fn new(concurrency: NonZeroUsize) -> Self {
        Self {
            concurrency,
            progress: None,
            log_every: 100,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub const fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    /// Fetch every ID and return one outcome per ID, in completion order
    pub async fn run(&self, fetcher: &ItemFetcher, ids: &[ItemId]) -> Vec<FetchOutcome> {
        let total = ids.len();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency.get()));
        let mut tasks = JoinSet::new();
        let mut task_ids: HashMap<task::Id, ItemId> = HashMap::with_capacity(total);

        info!(
            "🚀 Dispatching {} fetches with semaphore control (max: {})",
            total,
            self.concurrency.get()
        );

        for &id in ids {
            let fetcher = fetcher.clone();
            let semaphore = Arc::clone(&semaphore);

            let handle = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FetchOutcome::from(
                            FetchFailure::new(id, ErrorKind::UnknownError)
                                .with_message("Semaphore acquisition failed"),
                        );
                    }
                };
                debug!("🔓 Acquired permit for item {}", id);
                fetcher.fetch(id).await
            });
            task_ids.insert(handle.id(), id);
        }

        let mut outcomes = Vec::with_capacity(total);
        let mut succeeded = 0;

        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(join_error) => {
                    let Some(&id) = task_ids.get(&join_error.id()) else {
                        error!("💥 Fetch task {} failed for an unknown item: {}", join_error.id(), join_error);
                        continue;
                    };
                    error!("💥 Fetch task for item {} failed: {}", id, join_error);
                    FetchFailure::new(id, ErrorKind::UnknownError)
                        .with_message(join_error.to_string())
                        .into()
                }
            };

            if outcome.is_success() {
                succeeded += 1;
            }
            outcomes.push(outcome);
            self.report(DispatchProgress {
                completed: outcomes.len(),
                total,
                succeeded,
                failed: outcomes.len() - succeeded,
            });
        }

        info!(
            "✅ Dispatched {} fetches in {:.2?} ({} succeeded, {} failed)",
            total,
            started.elapsed(),
            succeeded,
            outcomes.len() - succeeded
        );
        outcomes
    }

    fn report(&self, progress: DispatchProgress) {
        if progress.completed % self.log_every == 0 || progress.completed == progress.total {
            info!(
                "📊 Progress {}/{} ({} ok, {} failed)",
                progress.completed, progress.total, progress.succeeded, progress.failed
            );
        }
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}

//! 배치 실행기 - sequential batch processing
//!
//! The ID list is split into contiguous batches. Each batch gets a fresh
//! transport, runs through the dispatcher, and is handed to the sink before
//! the next batch starts.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use super::fetcher::{FetcherSettings, ItemFetcher};
use super::retry::{Pacer, PauseKind};
use crate::domain::{BatchResult, ItemId, partition};
use crate::infrastructure::batch_writer::{BatchSink, SinkError};
use crate::infrastructure::http_client::{TransportError, TransportFactory};

/// Errors that stop a run. Individual fetch failures never do.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("failed to open transport for batch {label}: {source}")]
    Transport {
        label: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to write batch {label}: {source}")]
    Sink {
        label: String,
        #[source]
        source: SinkError,
    },
}

/// Totals for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub batches: usize,
    pub outcomes: usize,
    pub successes: usize,
    pub failures: usize,
}

/// Drives batches through the dispatcher one at a time
pub struct BatchRunner {
    batch_size: NonZeroUsize,
    dispatcher: Dispatcher,
    transports: Arc<dyn TransportFactory>,
    sink: Arc<dyn BatchSink>,
    pacer: Arc<dyn Pacer>,
    settings: Arc<FetcherSettings>,
    batch_delay: Duration,
}

impl BatchRunner {
    pub fn new(
        batch_size: NonZeroUsize,
        dispatcher: Dispatcher,
        transports: Arc<dyn TransportFactory>,
        sink: Arc<dyn BatchSink>,
        pacer: Arc<dyn Pacer>,
        settings: FetcherSettings,
    ) -> Self {
        Self {
            batch_size,
            dispatcher,
            transports,
            sink,
            pacer,
            settings: Arc::new(settings),
            batch_delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive batches
    #[must_use]
    pub const fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Process every batch in input order
    pub async fn run(&self, ids: &[ItemId]) -> Result<RunReport, CrawlError> {
        let batches = partition(ids, self.batch_size);
        let started = Instant::now();
        let mut report = RunReport::default();

        info!(
            "🚀 Starting crawl: {} items in {} batches (batch size {}, concurrency {})",
            ids.len(),
            batches.len(),
            self.batch_size,
            self.dispatcher.concurrency()
        );

        for batch in &batches {
            if batch.index > 0 {
                self.pacer.pause(PauseKind::BatchDelay, self.batch_delay).await;
            }

            let label = batch.label();
            info!("📦 Batch {}/{} [{}] ({} items)", batch.index + 1, batches.len(), label, batch.len());

            let transport = self
                .transports
                .open(self.dispatcher.concurrency())
                .map_err(|source| CrawlError::Transport {
                    label: label.clone(),
                    source,
                })?;
            let fetcher = ItemFetcher::new(transport, Arc::clone(&self.pacer), Arc::clone(&self.settings));

            let result = BatchResult::new(self.dispatcher.run(&fetcher, batch.ids).await);
            drop(fetcher);

            if result.failure_count() > 0 {
                warn!("⚠️ Batch [{}]: {} of {} failed", label, result.failure_count(), result.len());
            }

            self.sink
                .write_batch(batch.start, batch.end, &result)
                .await
                .map_err(|source| CrawlError::Sink {
                    label: label.clone(),
                    source,
                })?;

            report.batches += 1;
            report.outcomes += result.len();
            report.successes += result.success_count();
            report.failures += result.failure_count();
        }

        info!(
            "🏁 Crawl finished in {:.2?}: {} batches, {} outcomes ({} ok, {} failed)",
            started.elapsed(),
            report.batches,
            report.outcomes,
            report.successes,
            report.failures
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::fetcher::tests::{RecordingPacer, json, status, test_settings};
    use crate::infrastructure::http_client::{
        CatalogRequest, CatalogResponse, CatalogTransport,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Open(usize),
        Fetch(String),
        Write(usize, usize, usize),
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    struct LoggingTransport {
        log: Log,
    }

    #[async_trait]
    impl CatalogTransport for LoggingTransport {
        async fn get(&self, request: &CatalogRequest) -> Result<CatalogResponse, TransportError> {
            let id = request.url.rsplit('/').next().unwrap_or_default().to_string();
            self.log.lock().unwrap().push(Event::Fetch(id.clone()));
            if id == "4" {
                status(404)
            } else {
                json(&format!(r#"{{"id": {id}}}"#))
            }
        }
    }

    struct LoggingFactory {
        log: Log,
        fail_on: Option<usize>,
        opened: AtomicUsize,
    }

    impl TransportFactory for LoggingFactory {
        fn open(&self, pool_size: usize) -> Result<Arc<dyn CatalogTransport>, TransportError> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(n) {
                return Err(TransportError::Client("tls backend unavailable".into()));
            }
            self.log.lock().unwrap().push(Event::Open(pool_size));
            Ok(Arc::new(LoggingTransport { log: Arc::clone(&self.log) }))
        }
    }

    struct LoggingSink {
        log: Log,
        fail: bool,
    }

    #[async_trait]
    impl BatchSink for LoggingSink {
        async fn write_batch(&self, start: usize, end: usize, result: &BatchResult) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Write {
                    path: "/dev/full".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.log.lock().unwrap().push(Event::Write(start, end, result.len()));
            Ok(())
        }
    }

    fn runner(log: &Log, fail_open_on: Option<usize>, fail_sink: bool, pacer: Arc<RecordingPacer>) -> BatchRunner {
        BatchRunner::new(
            NonZeroUsize::new(3).unwrap(),
            Dispatcher::new(NonZeroUsize::new(2).unwrap()),
            Arc::new(LoggingFactory {
                log: Arc::clone(log),
                fail_on: fail_open_on,
                opened: AtomicUsize::new(0),
            }),
            Arc::new(LoggingSink {
                log: Arc::clone(log),
                fail: fail_sink,
            }),
            pacer,
            test_settings(),
        )
        .with_batch_delay(Duration::from_millis(500))
    }

    fn ids(n: u64) -> Vec<ItemId> {
        (1..=n).map(ItemId).collect()
    }

    #[tokio::test]
    async fn batches_run_sequentially_with_offsets() {
        let log: Log = Arc::default();
        let pacer = Arc::new(RecordingPacer::default());

        let report = runner(&log, None, false, pacer.clone()).run(&ids(7)).await.unwrap();

        assert_eq!(
            report,
            RunReport {
                batches: 3,
                outcomes: 7,
                successes: 6,
                failures: 1
            }
        );

        let events = log.lock().unwrap().clone();
        let writes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::Write(..)))
            .cloned()
            .collect();
        assert_eq!(
            writes,
            vec![Event::Write(1, 3, 3), Event::Write(4, 6, 3), Event::Write(7, 7, 1)]
        );

        // Every fetch of batch N happens between its open and its write
        let mut batch_of_fetch = Vec::new();
        let mut current = 0;
        for event in &events {
            match event {
                Event::Open(pool) => {
                    assert_eq!(*pool, 2);
                    current += 1;
                }
                Event::Fetch(id) => batch_of_fetch.push((id.parse::<usize>().unwrap(), current)),
                Event::Write(..) => {}
            }
        }
        for (id, batch) in batch_of_fetch {
            assert_eq!(batch, (id - 1) / 3 + 1, "item {id} fetched outside its batch");
        }

        assert_eq!(
            pacer.of_kind(PauseKind::BatchDelay),
            vec![Duration::from_millis(500); 2]
        );
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let log: Log = Arc::default();
        let report = runner(&log, None, false, Arc::default()).run(&[]).await.unwrap();
        assert_eq!(report, RunReport::default());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sink_error_stops_the_run() {
        let log: Log = Arc::default();
        let err = runner(&log, None, true, Arc::default()).run(&ids(7)).await.unwrap_err();

        assert!(matches!(err, CrawlError::Sink { ref label, .. } if label == "00001_00003"));
        let opens = log.lock().unwrap().iter().filter(|e| matches!(e, Event::Open(_))).count();
        assert_eq!(opens, 1);
    }

    #[tokio::test]
    async fn transport_error_names_the_batch() {
        let log: Log = Arc::default();
        let err = runner(&log, Some(1), false, Arc::default()).run(&ids(7)).await.unwrap_err();

        assert!(matches!(err, CrawlError::Transport { ref label, .. } if label == "00004_00006"));
        let writes = log.lock().unwrap().iter().filter(|e| matches!(e, Event::Write(..))).count();
        assert_eq!(writes, 1);
    }
}

//! Infrastructure layer: configuration, logging, HTTP transport and file I/O
//!
//! Everything here talks to the outside world (network, filesystem,
//! environment) or is a pure helper the crawling engine plugs in.

pub mod batch_writer;
pub mod config;
pub mod description;
pub mod http_client;
pub mod id_source;
pub mod logging;
pub mod summary;

// Re-export commonly used items
pub use batch_writer::{BatchSink, JsonBatchWriter, SinkError, artifact_file_name};
pub use config::{AppConfig, ConfigError};
pub use description::normalize_description;
pub use http_client::{
    CatalogRequest, CatalogResponse, CatalogTransport, HttpClient, HttpClientFactory, TransportError,
    TransportFactory,
};
pub use id_source::{IdSourceError, load_item_ids, read_item_ids};
pub use logging::init_logging_with_config;
pub use summary::{SummaryError, SummaryReport, summarize_dir, summarize_records};

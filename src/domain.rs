//! Domain module - catalog items, fetch outcomes and batches
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod batch;
pub mod outcome;
pub mod product;

pub use batch::{Batch, BatchResult, partition};
pub use outcome::{ErrorKind, FetchFailure, FetchOutcome, OutcomeRecord};
pub use product::{ItemId, ProductRecord};

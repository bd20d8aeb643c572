//! Batch partitioning
//!
//! A batch is a contiguous slice of the input ID list. Its 1-based start/end
//! offsets name the artifact it produces, so artifacts sort and deduplicate
//! by file name.

use std::num::NonZeroUsize;

use super::outcome::FetchOutcome;
use super::product::ItemId;

/// Contiguous slice of the ID list processed as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// 0-based position of the batch in the run
    pub index: usize,
    /// 1-based offset of the first ID in the input list
    pub start: usize,
    /// 1-based offset of the last ID in the input list
    pub end: usize,
    pub ids: &'a [ItemId],
}

impl Batch<'_> {
    pub const fn len(&self) -> usize {
        self.ids.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Stable label built from the offsets, e.g. `00001_01000`
    pub fn label(&self) -> String {
        format!("{:05}_{:05}", self.start, self.end)
    }
}

/// Split `ids` into contiguous batches of at most `batch_size`, keeping input order
pub fn partition(ids: &[ItemId], batch_size: NonZeroUsize) -> Vec<Batch<'_>> {
    let size = batch_size.get();
    ids.chunks(size)
        .enumerate()
        .map(|(index, chunk)| {
            let start = index * size + 1;
            Batch {
                index,
                start,
                end: start + chunk.len() - 1,
                ids: chunk,
            }
        })
        .collect()
}

/// Outcomes of one batch in completion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub outcomes: Vec<FetchOutcome>,
}

impl BatchResult {
    pub fn new(outcomes: Vec<FetchOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Outcomes re-sorted by item ID, for consumers that want input-like order
    pub fn sorted_by_id(&self) -> Vec<&FetchOutcome> {
        let mut sorted: Vec<&FetchOutcome> = self.outcomes.iter().collect();
        sorted.sort_by_key(|o| o.id());
        sorted
    }
}

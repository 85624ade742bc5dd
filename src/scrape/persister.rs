//! Batched persistence of extracted policy records.

use tracing::debug;

use crate::error::Result;
use crate::models::PolicyRecord;
use crate::repository::PolicyRepository;

use super::RecordSink;

/// Writes records in fixed-size batches to bound single-write payload size.
/// A failed batch aborts the whole operation (no partial-batch retry);
/// batches already committed remain durable.
pub struct BatchPersister {
    records: PolicyRepository,
    batch_size: usize,
}

impl BatchPersister {
    pub fn new(records: PolicyRepository, batch_size: usize) -> Self {
        Self {
            records,
            batch_size: batch_size.max(1),
        }
    }
}

impl RecordSink for BatchPersister {
    fn persist_page(&self, job_id: &str, page: u32, records: &[PolicyRecord]) -> Result<usize> {
        for chunk in records.chunks(self.batch_size) {
            self.records.insert_batch(chunk)?;
            debug!(job_id, page, batch = chunk.len(), "persisted record batch");
        }
        Ok(records.len())
    }
}

//! Failure log for items dropped during a run.
//!
//! Every failed or skipped item is recorded as one NDJSON line under
//! `<namespace>/failures/failures-<timestamp>.ndjson` for later inspection.
//! The whole run's records are rewritten on each flush, so the stored log is
//! always complete up to the last flush.

mod types;

pub use types::{FailedItem, FailureStats};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::emit;
use crate::error::{FailureLogError, FailureLogSerializeSnafu, FailureLogWriteSnafu};
use crate::metrics::events::{FailureStage, ItemFailed};
use crate::storage::{BlobMetadata, StorageGatewayRef};

/// Records flushed after this many new failures.
pub const DEFAULT_FLUSH_EVERY: usize = 100;

pub struct FailureLog {
    storage: StorageGatewayRef,
    key: String,
    records: Vec<FailedItem>,
    unflushed: usize,
    flush_every: usize,
    stats: FailureStats,
}

impl FailureLog {
    pub fn new(storage: StorageGatewayRef, namespace: &str, started_at: DateTime<Utc>) -> Self {
        let key = format!(
            "{}/failures/failures-{}.ndjson",
            namespace,
            started_at.format("%Y%m%d-%H%M%S")
        );
        info!("Failure log enabled: {}", key);

        Self {
            storage,
            key,
            records: Vec::new(),
            unflushed: 0,
            flush_every: DEFAULT_FLUSH_EVERY,
            stats: FailureStats::default(),
        }
    }

    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every.max(1);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn stats(&self) -> FailureStats {
        self.stats
    }

    /// Record one failure. Flush errors are logged, not returned.
    pub async fn record(&mut self, item: &str, error: &str, stage: FailureStage) {
        debug!("Recording failure: {} at stage {}", item, stage.as_str());
        emit!(ItemFailed { stage });

        self.stats.increment(stage);
        self.records.push(FailedItem {
            item: item.to_string(),
            error: error.to_string(),
            stage,
            timestamp: Utc::now(),
        });
        self.unflushed += 1;

        if self.unflushed >= self.flush_every
            && let Err(e) = self.flush().await
        {
            warn!("Failed to flush failure log: {}", e);
        }
    }

    /// Write all records so far. Nothing is written for a clean run.
    pub async fn flush(&mut self) -> Result<(), FailureLogError> {
        if self.unflushed == 0 {
            return Ok(());
        }

        let mut ndjson = String::new();
        for record in &self.records {
            let line = serde_json::to_string(record).context(FailureLogSerializeSnafu)?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }

        self.storage
            .put(
                &self.key,
                Bytes::from(ndjson),
                "application/x-ndjson",
                &BlobMetadata::new(),
            )
            .await
            .context(FailureLogWriteSnafu)?;

        debug!("Flushed {} failure records", self.unflushed);
        self.unflushed = 0;
        Ok(())
    }

    /// Flush remaining records and log the per-stage totals.
    pub async fn finalize(&mut self) -> Result<FailureStats, FailureLogError> {
        self.flush().await?;
        let stats = self.stats;
        if stats.total() > 0 {
            info!(
                "Failure log finalized: {} total (fetch={}, parse={}, validate={}, upload={})",
                stats.total(),
                stats.fetch,
                stats.parse,
                stats.validate,
                stats.upload
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageGateway;
    use std::sync::Arc;

    async fn memory_storage() -> StorageGatewayRef {
        Arc::new(StorageGateway::for_url("memory://").await.unwrap())
    }

    fn started_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-26T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_key_layout() {
        let log = FailureLog::new(memory_storage().await, "catalog", started_at());
        assert_eq!(log.key(), "catalog/failures/failures-20250126-103000.ndjson");
    }

    #[tokio::test]
    async fn test_clean_run_writes_nothing() {
        let storage = memory_storage().await;
        let mut log = FailureLog::new(storage.clone(), "catalog", started_at());
        let stats = log.finalize().await.unwrap();

        assert_eq!(stats.total(), 0);
        assert!(storage.list("catalog/failures").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_are_ndjson() {
        let storage = memory_storage().await;
        let mut log = FailureLog::new(storage.clone(), "catalog", started_at());

        log.record("9999999", "Title 9999999 not found", FailureStage::Fetch)
            .await;
        log.record("42", "score 11 outside [0, 10]", FailureStage::Validate)
            .await;
        let stats = log.finalize().await.unwrap();
        assert_eq!(stats.fetch, 1);
        assert_eq!(stats.validate, 1);

        let bytes = storage.get(log.key()).await.unwrap();
        let content = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: FailedItem = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.item, "9999999");
        assert_eq!(first.stage, FailureStage::Fetch);
    }

    #[tokio::test]
    async fn test_periodic_flush_keeps_earlier_records() {
        let storage = memory_storage().await;
        let mut log = FailureLog::new(storage.clone(), "catalog", started_at()).with_flush_every(2);

        for id in 0..3 {
            log.record(&id.to_string(), "boom", FailureStage::Parse).await;
        }
        // Two records were flushed automatically, the third is still buffered.
        let bytes = storage.get(log.key()).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&bytes).lines().count(), 2);

        log.finalize().await.unwrap();
        let bytes = storage.get(log.key()).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&bytes).lines().count(), 3);
    }
}

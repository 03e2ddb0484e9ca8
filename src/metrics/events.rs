//! Internal events for metrics emission.
//!
//! Each event struct is one measurable occurrence in a run. Events implement
//! [`InternalEvent`], which records the matching Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Fetch events
// ============================================================================

/// Result of one external call.
#[derive(Debug, Clone, Copy)]
pub enum FetchOutcome {
    Success,
    NotFound,
    Error,
}

impl FetchOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Success => "success",
            FetchOutcome::NotFound => "not_found",
            FetchOutcome::Error => "error",
        }
    }
}

/// Event emitted after every external call, retries included.
pub struct FetchAttempt {
    pub outcome: FetchOutcome,
}

impl InternalEvent for FetchAttempt {
    fn emit(self) {
        trace!(outcome = self.outcome.as_str(), "Fetch attempt");
        counter!("catalog_roi_fetch_attempts_total", "outcome" => self.outcome.as_str())
            .increment(1);
    }
}

/// Event emitted when a failed call is scheduled for another attempt.
pub struct FetchRetry;

impl InternalEvent for FetchRetry {
    fn emit(self) {
        trace!("Fetch retry scheduled");
        counter!("catalog_roi_fetch_retries_total").increment(1);
    }
}

/// Event emitted when the rate limiter delays a call.
pub struct RateLimitWait {
    pub duration: Duration,
}

impl InternalEvent for RateLimitWait {
    fn emit(self) {
        trace!(wait_ms = self.duration.as_millis(), "Rate limit wait");
        histogram!("catalog_roi_rate_limit_wait_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Item and run events
// ============================================================================

/// Final status of one requested identifier.
#[derive(Debug, Clone, Copy)]
pub enum ItemStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl ItemStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Succeeded => "succeeded",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

/// Stage at which an item or artifact failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Fetch,
    Parse,
    Validate,
    Upload,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Fetch => "fetch",
            FailureStage::Parse => "parse",
            FailureStage::Validate => "validate",
            FailureStage::Upload => "upload",
        }
    }
}

/// Event emitted once per requested identifier.
pub struct ItemProcessed {
    pub status: ItemStatus,
}

impl InternalEvent for ItemProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Item processed");
        counter!("catalog_roi_items_processed_total", "status" => self.status.as_str())
            .increment(1);
    }
}

/// Event emitted when an item is dropped or an upload fails.
pub struct ItemFailed {
    pub stage: FailureStage,
}

impl InternalEvent for ItemFailed {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Item failed");
        counter!("catalog_roi_failures_total", "stage" => self.stage.as_str()).increment(1);
    }
}

/// Gauge of identifiers handled so far in the current run.
pub struct RunProgress {
    pub processed: usize,
    pub total: usize,
}

impl InternalEvent for RunProgress {
    fn emit(self) {
        trace!(processed = self.processed, total = self.total, "Run progress");
        gauge!("catalog_roi_run_processed_items").set(self.processed as f64);
        gauge!("catalog_roi_run_total_items").set(self.total as f64);
    }
}

/// Event emitted on every orchestrator phase transition.
pub struct PhaseEntered {
    pub phase: &'static str,
}

impl InternalEvent for PhaseEntered {
    fn emit(self) {
        trace!(phase = self.phase, "Phase entered");
        counter!("catalog_roi_phase_transitions_total", "phase" => self.phase).increment(1);
    }
}

/// Event emitted after a processed table is stored, or fails to be.
pub struct ArtifactWritten {
    pub artifact: &'static str,
    pub rows: usize,
    pub bytes: usize,
    pub success: bool,
}

impl InternalEvent for ArtifactWritten {
    fn emit(self) {
        let status = if self.success { "success" } else { "error" };
        trace!(
            artifact = self.artifact,
            rows = self.rows,
            bytes = self.bytes,
            status,
            "Artifact written"
        );
        counter!("catalog_roi_artifacts_total", "artifact" => self.artifact, "status" => status)
            .increment(1);
        if self.success {
            counter!("catalog_roi_artifact_rows_total", "artifact" => self.artifact)
                .increment(self.rows as u64);
            counter!("catalog_roi_bytes_written_total").increment(self.bytes as u64);
        }
    }
}

/// Event emitted after ROI attribution.
pub struct RoiRecordsComputed {
    pub count: usize,
    pub unmatched: usize,
}

impl InternalEvent for RoiRecordsComputed {
    fn emit(self) {
        trace!(count = self.count, unmatched = self.unmatched, "ROI records computed");
        counter!("catalog_roi_roi_records_total").increment(self.count as u64);
        counter!("catalog_roi_roi_unmatched_deals_total").increment(self.unmatched as u64);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "catalog_roi_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the duration of a completed storage request.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "catalog_roi_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

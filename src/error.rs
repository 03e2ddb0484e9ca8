//! Error types for catalog-roi using snafu.
//!
//! Each concern gets its own error enum with context selectors; the
//! orchestrator aggregates them into [`PipelineError`]. Per-item outcomes
//! that the pipeline counts rather than propagates ([`Rejection`],
//! [`ValidationIssue`]) live here too so every failure has one display form.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed for {key}"))]
    ObjectStore {
        key: String,
        source: object_store::Error,
    },

    /// IO error while preparing a local backend.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// Local filesystem backend could not be created.
    #[snafu(display("Local storage configuration error"))]
    LocalConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source, .. } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source API base URL is empty.
    #[snafu(display("Source base_url cannot be empty"))]
    EmptyBaseUrl,

    /// Identifier list path is empty.
    #[snafu(display("Source identifiers_path cannot be empty"))]
    EmptyIdentifiersPath,

    /// Storage URL is empty.
    #[snafu(display("Storage url cannot be empty"))]
    EmptyStorageUrl,

    /// Storage namespace is empty.
    #[snafu(display("Storage namespace cannot be empty"))]
    EmptyNamespace,

    /// Retry policy would never attempt a call.
    #[snafu(display("Retry max_attempts must be at least 1"))]
    ZeroAttempts,

    /// Attribution rate outside of [0, 1].
    #[snafu(display("Attribution rate {name} must be within [0, 1], got {value}"))]
    InvalidAttributionRate { name: &'static str, value: f64 },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Fetch Errors ============

/// Errors from the external title lookup.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The upstream API has no entity with this id. Never retried.
    #[snafu(display("Title {id} not found"))]
    NotFound { id: i64 },

    /// The upstream API answered with a non-success status.
    #[snafu(display("HTTP {status} while fetching title {id}"))]
    HttpStatus { id: i64, status: u16 },

    /// Transport-level failure (connect, timeout, TLS).
    #[snafu(display("Request for title {id} failed"))]
    Request { id: i64, source: reqwest::Error },

    /// Response body was not valid JSON.
    #[snafu(display("Failed to decode response for title {id}"))]
    Decode { id: i64, source: reqwest::Error },

    /// HTTP client could not be constructed.
    #[snafu(display("Failed to build HTTP client"))]
    ClientBuild { source: reqwest::Error },

    /// Every attempt allowed by the retry policy failed.
    #[snafu(display("Title {id} failed after {attempts} attempts"))]
    RetriesExhausted {
        id: i64,
        attempts: u32,
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Permanent failures that must not consume retry budget.
    pub fn is_not_found(&self) -> bool {
        match self {
            FetchError::NotFound { .. } => true,
            FetchError::RetriesExhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Default retry classification: everything except not-found.
    pub fn is_retryable(&self) -> bool {
        !self.is_not_found() && !matches!(self, FetchError::ClientBuild { .. })
    }
}

// ============ Transformation outcomes ============

/// Why a raw payload or source row could not become a typed record.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Rejection {
    /// Payload has no `data` object.
    #[snafu(display("payload has no data object"))]
    MissingData,

    /// A required field is absent or empty.
    #[snafu(display("missing required field {field}"))]
    MissingField { field: &'static str },

    /// A numeric field that must be present could not be coerced.
    #[snafu(display("field {field} is not numeric: {value:?}"))]
    NotNumeric { field: &'static str, value: String },

    /// License type outside of Exclusive/Shared/Broadcast.
    #[snafu(display("unknown license type {value:?}"))]
    UnknownLicenseType { value: String },
}

/// Why a typed record failed validation.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum ValidationIssue {
    #[snafu(display("identifier {raw:?} is not an integer"))]
    NonIntegerId { raw: String },

    #[snafu(display("title is empty"))]
    EmptyTitle,

    #[snafu(display("score {score} outside [0, 10]"))]
    ScoreOutOfRange { score: f64 },

    #[snafu(display("episode count {episodes} is negative"))]
    NegativeEpisodes { episodes: i64 },

    #[snafu(display("identifier {id} already present in batch"))]
    DuplicateId { id: i64 },

    #[snafu(display("cost {cost} is negative"))]
    NegativeCost { cost: f64 },

    #[snafu(display("{field} {value} is negative"))]
    NegativeValue { field: &'static str, value: f64 },

    #[snafu(display("region code is empty"))]
    EmptyRegion,
}

// ============ Table Errors ============

/// Errors that can occur while encoding or decoding CSV tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TableError {
    /// A row could not be serialized.
    #[snafu(display("Failed to write row to {table}"))]
    CsvWrite { table: String, source: csv::Error },

    /// The writer could not be flushed into its buffer.
    #[snafu(display("Failed to flush {table}"))]
    CsvFlush {
        table: String,
        source: std::io::Error,
    },

    /// A row could not be deserialized.
    #[snafu(display("Failed to read row from {table}"))]
    CsvRead { table: String, source: csv::Error },
}

// ============ Persistence Errors ============

/// Errors while storing one raw payload or processed artifact.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PersistError {
    /// Raw payload could not be rendered as JSON.
    #[snafu(display("Failed to encode raw payload for title {id}"))]
    RawEncode {
        id: i64,
        source: serde_json::Error,
    },

    /// Table could not be encoded.
    #[snafu(display("Failed to encode {artifact}"))]
    Encode {
        artifact: String,
        source: TableError,
    },

    /// Upload to the storage gateway failed.
    #[snafu(display("Failed to upload {key}"))]
    Upload { key: String, source: StorageError },

    /// Local copy could not be written.
    #[snafu(display("Failed to write local copy {}", path.display()))]
    LocalCopy {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

// ============ Licensing Errors ============

/// Errors while loading a licensing source table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LicensingError {
    /// Source table could not be read from storage.
    #[snafu(display("Failed to read licensing table {key}"))]
    LicensingRead { key: String, source: StorageError },

    /// Source table is not valid CSV.
    #[snafu(display("Failed to decode licensing table {key}"))]
    LicensingDecode { key: String, source: TableError },
}

// ============ Failure log Errors ============

/// Errors that can occur while writing the failure log.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FailureLogError {
    /// Failed to write the failure log.
    #[snafu(display("Failed to write failure log"))]
    FailureLogWrite { source: StorageError },

    /// Failed to serialize a failure record.
    #[snafu(display("Failed to serialize failure record"))]
    FailureLogSerialize { source: serde_json::Error },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Storage error.
    #[snafu(display("Storage error"))]
    PipelineStorage { source: StorageError },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Fetch client could not be set up.
    #[snafu(display("Fetch client error"))]
    FetchSetup { source: FetchError },

    /// The identifier list could not be read.
    #[snafu(display("Failed to read identifier list {path}"))]
    ReadIdentifiers {
        path: String,
        source: std::io::Error,
    },

    /// The identifier list contained no usable identifiers.
    #[snafu(display("Identifier list {path} contains no valid identifiers"))]
    NoIdentifiers { path: String },

    /// Nothing survived fetch, parse and validation.
    #[snafu(display(
        "No records survived to aggregation ({requested} requested, {failed} failed, {skipped} skipped)"
    ))]
    NoSurvivors {
        requested: usize,
        failed: usize,
        skipped: usize,
    },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// One or more processed artifacts could not be stored.
    #[snafu(display("Failed to store artifacts: {names}"))]
    ArtifactsFailed { names: String },
}

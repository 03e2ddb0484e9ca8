//! catalog-roi: batch ETL for title catalog metadata and licensing ROI.
//!
//! A run fetches title metadata from a rate-limited public API, stores each
//! raw payload, normalizes and validates the catalog, joins it with
//! licensing deals and regional revenue, and writes the processed tables as
//! CSV through a storage gateway (S3, local filesystem or memory).
//!
//! # Example
//!
//! ```ignore
//! use catalog_roi::{Config, run_pipeline};
//! use catalog_roi::error::{ConfigSnafu, PipelineError};
//! use snafu::ResultExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("config.yaml").context(ConfigSnafu)?;
//!     let report = run_pipeline(config, None).await?;
//!     println!("Success rate {}", report.stats.success_rate_display());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod failures;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod roi;
pub mod storage;
pub mod table;
pub mod transform;
pub mod validate;

pub use config::Config;
pub use pipeline::{Pipeline, PipelineRunStats, RunReport, run_pipeline};
pub use storage::{StorageGateway, StorageGatewayRef};

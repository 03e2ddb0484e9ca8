//! catalog-roi: fetches title metadata, builds the cleaned catalog and
//! computes licensing ROI, writing every artifact to object storage.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use catalog_roi::config::Config;
use catalog_roi::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use catalog_roi::metrics;
use catalog_roi::pipeline::{load_identifiers, run_pipeline};

/// Title catalog and licensing ROI batch job.
#[derive(Parser, Debug)]
#[command(name = "catalog-roi")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Identifiers to fetch instead of the configured list (comma separated).
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<i64>>,

    /// Dry run - validate configuration and the identifier list without fetching.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("catalog-roi starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Source: {}", config.source.base_url);
        info!("Storage: {} (namespace {})", config.storage.url, config.namespace());
        match &config.licensing {
            Some(licensing) => info!(
                "Licensing: deals={} regional={}",
                licensing.deals_key, licensing.regional_key
            ),
            None => info!("Licensing: not configured"),
        }
        match &args.ids {
            Some(ids) => info!("Identifiers: {} from the command line", ids.len()),
            None => {
                let list = load_identifiers(&config.source.identifiers_path).await?;
                info!(
                    "Identifiers: {} valid, {} malformed",
                    list.ids.len(),
                    list.malformed.len()
                );
            }
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let report = run_pipeline(config, args.ids).await?;
    report.log();

    ensure!(
        report.is_complete(),
        catalog_roi::error::ArtifactsFailedSnafu {
            names: report.failed_names()
        }
    );

    info!("Run completed successfully");
    Ok(())
}

use iceberg_pulse::analyze::TableSource;
use iceberg_pulse::catalog::{TableIdentifier, VersionHintCatalog};
use iceberg_pulse::storage::StorageProviderFactory;
use iceberg_pulse::{Analyzer, StorageConfig};
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const STORAGE_PREFIX: &str = "ICEBERG_PULSE_STORAGE_";

fn env_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let target = env::args().nth(1).ok_or(
        "usage: iceberg-pulse <metadata location | namespace.table>\n\
         storage is configured through ICEBERG_PULSE_STORAGE_* variables",
    )?;

    info!("Starting Iceberg Pulse, target={}", target);

    let storage_config = StorageConfig::from_env(STORAGE_PREFIX)?;
    let storage = StorageProviderFactory::from_config(storage_config).await?;

    let mut builder = Analyzer::builder_with_storage(Arc::clone(&storage))
        .with_orphan_detection(env_var::<bool>("ICEBERG_PULSE_ORPHANS").unwrap_or(false));
    if let Some(parallelism) = env_var::<usize>("ICEBERG_PULSE_PARALLELISM") {
        builder = builder.with_parallelism(parallelism);
    }
    if let Some(secs) = env_var::<u64>("ICEBERG_PULSE_DEADLINE_SECS") {
        builder = builder.with_deadline(Duration::from_secs(secs));
    }
    if let Some(days) = env_var::<u64>("ICEBERG_PULSE_RETENTION_DAYS") {
        builder = builder.with_snapshot_retention(Duration::from_secs(days * 24 * 60 * 60));
    }

    let source = if target.ends_with(".metadata.json") {
        TableSource::MetadataLocation(target.clone())
    } else {
        let warehouse = env::var("ICEBERG_PULSE_WAREHOUSE")
            .map_err(|_| "ICEBERG_PULSE_WAREHOUSE is required to resolve a table identifier")?;
        builder = builder.with_catalog(Arc::new(VersionHintCatalog::new(
            Arc::clone(&storage),
            &warehouse,
        )));
        TableSource::Catalog(TableIdentifier::from_str(&target)?)
    };

    let analyzer = builder.build().await?;
    let report = analyzer.analyze(source).await?;

    if let Ok(path) = env::var("ICEBERG_PULSE_OUTPUT") {
        let mut f = File::create(&path)?;
        f.write_all(report.to_json(false)?.as_bytes())?;
        info!("Wrote JSON report, path={}", path);
    }

    println!("{}", report);
    Ok(())
}

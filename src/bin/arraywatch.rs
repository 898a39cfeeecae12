use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arraywatch::{
    actors::TrapReceiverHandle,
    alerts::AlertProcessor,
    config::{Config, StorageConfig, read_config_file},
    db::{Database, MemoryDatabase},
    drivers::{DriverManager, DriverRegistry},
    exporter::{AlertExporter, ExportManager},
    scheduler::Scheduler,
    tasks::{CollectionOrchestrator, PerformanceCollectionTask},
    util::apply_env_overrides,
};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: String,

    /// Log level for the arraywatch targets
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new()
        .with_targets(vec![("arraywatch", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)?;
    apply_env_overrides(&mut config.trap_receiver);

    let db = open_database(&config.storage).await?;
    seed_database(db.as_ref(), &config).await?;

    let registry = Arc::new(DriverRegistry::with_builtin_drivers(db.clone()));
    let drivers = DriverManager::new(registry, config.drivers.call_timeout());
    let sinks = Arc::new(ExportManager::from_config(&config.exporters)?);
    let exporter = AlertExporter::new(sinks, drivers.clone());
    let processor = AlertProcessor::new(db.clone(), drivers.clone(), exporter.clone());

    let sources = db
        .alert_source_get_all()
        .await
        .context("failed to load alert sources")?;
    let listener = TrapReceiverHandle::spawn(&config.trap_receiver, sources, processor).await?;
    info!("trap listener bound to {}", listener.local_addr());

    let scheduler = Scheduler::new(config.scheduler.workers);
    let collector = PerformanceCollectionTask::new(
        db.clone(),
        drivers,
        exporter,
        scheduler.clone(),
        &config.collection,
    );
    let orchestrator = CollectionOrchestrator::new(
        db,
        scheduler.clone(),
        collector,
        Duration::from_secs(config.scheduler.collection_interval),
    );
    orchestrator.initiate()?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    listener.stop().await;
    scheduler.shutdown();

    Ok(())
}

async fn open_database(storage: &StorageConfig) -> anyhow::Result<Arc<dyn Database>> {
    match storage {
        StorageConfig::None => {
            info!("using in-memory storage");
            Ok(Arc::new(MemoryDatabase::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let db = arraywatch::db::sqlite::SqliteDatabase::new(path)
                .await
                .context("failed to open sqlite database")?;
            Ok(Arc::new(db))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            warn!("sqlite storage requested but the storage-sqlite feature is disabled, using memory");
            Ok(Arc::new(MemoryDatabase::new()))
        }
    }
}

/// Loads the statically configured devices, sources and templates
async fn seed_database(db: &dyn Database, config: &Config) -> anyhow::Result<()> {
    for storage in &config.storages {
        db.storage_create(storage)
            .await
            .with_context(|| format!("failed to register storage {}", storage.id))?;
    }
    for source in &config.alert_sources {
        if db.storage_get(&source.storage_id).await.is_err() {
            warn!(storage_id = %source.storage_id, host = %source.host, "alert source refers to an unknown storage");
        }
        db.alert_source_create(source)
            .await
            .with_context(|| format!("failed to register alert source {}", source.host))?;
    }
    for template in &config.task_templates {
        db.task_template_create(template)
            .await
            .with_context(|| format!("failed to register task template {}", template.id))?;
    }
    Ok(())
}

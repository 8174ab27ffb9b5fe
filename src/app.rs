//! Wiring from [`Config`] to running components.

use std::sync::Arc;

use anyhow::{Context, Result};
use marquee_db::pool::{init_pool, DbPool};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, QueueBackend};
use crate::images::{ImagePipeline, ImageStorage};
use crate::metadata::providers::build_provider;
use crate::metadata::{
    MetadataFetcher, MetadataProcessor, MetadataProvider, MetadataUpdater, MetadataValidator,
    ProgressTracker,
};
use crate::queue::{ConsumerSettings, JobStore, MemoryJobStore, QueueConsumer, RedisJobStore};

/// Build the job store selected by `queue.backend`.
pub fn build_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    match config.queue.backend {
        QueueBackend::Redis => {
            let store = RedisJobStore::new(&config.redis.url)
                .with_context(|| format!("Invalid Redis URL: {}", config.redis.url))?;
            Ok(Arc::new(store))
        }
        QueueBackend::Memory => {
            tracing::warn!("Using in-memory queue backend; jobs are lost on exit");
            Ok(Arc::new(MemoryJobStore::new()))
        }
    }
}

/// Store for one-shot operator commands, which only make sense against a
/// queue shared with a running consumer.
pub fn build_shared_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    if config.queue.backend == QueueBackend::Memory {
        anyhow::bail!(
            "Queue backend is \"memory\"; its jobs live inside the running consumer and \
             cannot be reached from another process. Use the redis backend."
        );
    }
    build_store(config)
}

pub fn open_database(config: &Config) -> Result<DbPool> {
    let path = config.database.path.to_string_lossy();
    tracing::info!("Initializing database at {}", path);
    init_pool(&path).with_context(|| format!("Failed to open database at {}", path))
}

/// Assemble the metadata pipeline around an existing pool and provider.
pub fn build_processor(
    config: &Config,
    pool: DbPool,
    provider: Arc<dyn MetadataProvider>,
) -> Result<MetadataProcessor> {
    let storage = Arc::new(ImageStorage::new(
        config.images.cache_dir.clone(),
        config.images.url_prefix.clone(),
    ));
    let images = Arc::new(ImagePipeline::new(
        storage.clone(),
        config.images.download_timeout(),
    )?);

    Ok(MetadataProcessor::new(
        MetadataValidator::new(pool.clone(), storage),
        MetadataFetcher::new(provider, images, config.metadata.fetch_timeout()),
        MetadataUpdater::new(pool.clone()),
        ProgressTracker::new(pool),
    ))
}

/// Run the consumer until Ctrl-C, then drain in-flight jobs.
pub async fn run(config: Config) -> Result<()> {
    let store = build_store(&config)?;
    let pool = open_database(&config)?;
    let provider = build_provider(&config.metadata)?;
    let processor = build_processor(&config, pool, provider)?;

    std::fs::create_dir_all(&config.images.cache_dir).with_context(|| {
        format!(
            "Failed to create image cache directory: {:?}",
            config.images.cache_dir
        )
    })?;

    let consumer = QueueConsumer::new(
        store,
        Arc::new(processor),
        ConsumerSettings::from(&config.queue),
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested; draining in-flight jobs"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal.cancel();
    });

    consumer.run(shutdown).await;
    Ok(())
}

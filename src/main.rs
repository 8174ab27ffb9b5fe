mod cli;

use marquee::queue::JobStore;
use marquee::{app, config, metadata, queue};
use marquee_common::ScanJobId;
use marquee_db::pool::get_conn;
use marquee_db::queries::scan_jobs;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "marquee=trace,marquee_db=debug,marquee_common=debug,reqwest=debug".to_string()
        } else {
            "marquee=debug,marquee_db=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            tracing::info!(
                "Starting marquee consumer on queue {:?} with concurrency {}",
                config.queue.name,
                config.queue.concurrency
            );
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(app::run(config))
        }
        Commands::Enqueue {
            media_id,
            library_id,
            title,
            year,
            media_type,
            rescan,
            scan_job_id,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let mut job = queue::Job::new(media_id, library_id, title, media_type);
            job.year = year;
            job.rescan = rescan;
            job.scan_job_id = scan_job_id;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(enqueue(&config, &job))
        }
        Commands::Recover => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(recover(&config))
        }
        Commands::Status { scan_job } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(status(&config, scan_job))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("marquee {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn connect(config: &config::Config) -> Result<Arc<dyn JobStore>> {
    let store = app::build_shared_store(config)?;
    store
        .ping()
        .await
        .with_context(|| format!("Queue store unreachable at {}", config.redis.url))?;
    Ok(store)
}

async fn enqueue(config: &config::Config, job: &queue::Job) -> Result<()> {
    let store = connect(config).await?;
    queue::enqueue(store.as_ref(), &config.queue.name, job).await?;
    println!("Enqueued {} ({})", job.title, job.media_id);
    Ok(())
}

async fn recover(config: &config::Config) -> Result<()> {
    let store = connect(config).await?;
    let limits = queue::RecoveryLimits {
        max_items: config.queue.recovery_max_items,
        time_budget: config.queue.recovery_time_budget(),
    };
    let report = queue::recover_orphans(store.as_ref(), &config.queue.name, limits).await?;

    println!("Recovered: {}", report.recovered);
    if report.truncated {
        println!(
            "Stopped early; {} jobs remain in the processing list",
            report.remaining
        );
    }
    Ok(())
}

async fn status(config: &config::Config, scan_job: Option<ScanJobId>) -> Result<()> {
    let store = connect(config).await?;
    let name = &config.queue.name;

    println!("Queue: {}", name);
    println!("  Ready: {}", store.ready_len(name).await?);
    println!("  Processing: {}", store.processing_len(name).await?);

    if let Some(id) = scan_job {
        let pool = app::open_database(config)?;
        let conn = get_conn(&pool)?;
        let job = scan_jobs::get_scan_job(&conn, id)?
            .with_context(|| format!("Scan job not found: {}", id))?;

        println!("\nScan job: {}", job.id);
        println!("  Library: {}", job.library_id);
        println!("  Scan: {} ({} scanned)", job.scan_status, job.scanned_count);
        println!("  Metadata: {}", job.metadata_status);
        println!(
            "    Succeeded: {}, Failed: {}",
            job.metadata_success_count, job.metadata_failed_count
        );
        println!("  Progress: {}%", metadata::progress(&job));
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            config::validate_config(&config)?;
            print_summary(&config);
        }
    }

    Ok(())
}

fn print_summary(config: &config::Config) {
    println!("  Queue: {} ({:?})", config.queue.name, config.queue.backend);
    println!("  Concurrency: {}", config.queue.concurrency);
    println!(
        "  Retries: {} (base delay {}ms)",
        config.queue.max_retries, config.queue.base_delay_ms
    );
    println!("  Redis: {}", config.redis.url);
    println!("  Database: {:?}", config.database.path);
    println!("  Provider: {:?}", config.metadata.provider);
    println!("  Image cache: {:?}", config.images.cache_dir);
}

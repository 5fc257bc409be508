mod cli;
mod collaborators;
mod scheduler;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use sus_checkpoint::{create_backend, BackendKind};
use sus_core::config::CacheBackend;
use sus_core::SusConfig;
use sus_plugins::PluginDispatcher;

use crate::cli::{Cli, Commands};
use crate::collaborators::{FileOutputWriter, HtmdConverter};
use crate::scheduler::Scheduler;

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            return ExitCode::from(1);
        }
    };
    runtime.block_on(async_main())
}

async fn async_main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = config.validate() {
        error!(error = %e, "configuration error");
        return ExitCode::from(1);
    }

    let backend_kind = match config.cache.backend {
        CacheBackend::Sqlite => BackendKind::Sqlite,
        // No standalone in-memory backend exists; the JSON file is the
        // lightest-weight stand-in and is what `memory` mapped to even
        // before this selection was config-driven.
        CacheBackend::Memory => BackendKind::Json,
    };
    let checkpoint_filename = match backend_kind {
        BackendKind::Sqlite => "checkpoint.db",
        BackendKind::Json => "checkpoint.json",
    };
    let checkpoint_path = PathBuf::from(&config.cache.cache_dir).join(checkpoint_filename);
    let checkpoint: Arc<dyn sus_checkpoint::StateBackend> = match create_backend(
        &checkpoint_path,
        Some(backend_kind),
    )
    .await
    {
        Ok(backend) => Arc::from(backend),
        Err(e) => {
            error!(error = %e, "checkpoint initialization failed");
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Commands::Crawl { workers } => run_crawl(config, checkpoint, workers).await,
        Commands::Status => print_status(checkpoint).await,
    }
}

async fn run_crawl(
    config: SusConfig,
    checkpoint: Arc<dyn sus_checkpoint::StateBackend>,
    workers: usize,
) -> ExitCode {
    let plugins = Arc::new(PluginDispatcher::default());
    let converter = Arc::new(HtmdConverter);
    let base_dir = config.output.base_dir.clone();
    let writer = Arc::new(FileOutputWriter::new(base_dir));

    let scheduler = match Scheduler::new(config, checkpoint, plugins, converter, writer).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(1);
        }
    };

    match scheduler.run(workers).await {
        Ok(stats) => {
            info!(
                pages_crawled = stats.pages_crawled,
                pages_failed = stats.pages_failed,
                "crawl finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "crawl aborted");
            ExitCode::from(2)
        }
    }
}

async fn print_status(checkpoint: Arc<dyn sus_checkpoint::StateBackend>) -> ExitCode {
    match checkpoint.load_metadata().await {
        Ok(Some(metadata)) => {
            println!("config:        {}", metadata.config_name);
            println!("created:       {}", metadata.created_at);
            println!("last updated:  {}", metadata.last_updated);
            println!("pages crawled: {}", metadata.stats.pages_crawled);
            println!("pages failed:  {}", metadata.stats.pages_failed);
            println!("skipped:       {}", metadata.stats.skipped_existing);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("no checkpoint found yet");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to read checkpoint");
            ExitCode::from(2)
        }
    }
}

fn load_config(path: &std::path::Path) -> Result<SusConfig, anyhow::Error> {
    let config_str = std::fs::read_to_string(path).unwrap_or_else(|_| {
        warn!(path = %path.display(), "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    Ok(toml::from_str(&config_str)?)
}

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use catalog_crawler::crawling::{BatchRunner, Dispatcher, FetcherSettings, TokioPacer};
use catalog_crawler::infrastructure::config::AppConfig;
use catalog_crawler::infrastructure::logging::{init_logging_with_config, log_system_info};
use catalog_crawler::infrastructure::{HttpClientFactory, JsonBatchWriter, load_item_ids, summarize_dir};

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "catalog-crawler", version, about = "Fetch catalog products by ID into batched JSON files")]
struct Cli {
    /// Config file (TOML, JSON or YAML); defaults to config/default.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_source = AppConfig::config_source(cli.config.as_deref());
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Crawl {
            input,
            limit,
            output,
            concurrency,
            batch_size,
        } => {
            if let Some(input) = input {
                config.io.input_file = input;
            }
            if limit.is_some() {
                config.io.limit = limit;
            }
            if let Some(output) = output {
                config.io.output_dir = output;
            }
            if let Some(concurrency) = concurrency {
                config.batch.concurrency = concurrency;
            }
            if let Some(batch_size) = batch_size {
                config.batch.batch_size = batch_size;
            }
            config.validate().context("Invalid configuration after CLI overrides")?;

            init_logging_with_config(config.logging.clone()).context("Failed to initialize logging")?;
            match &config_source {
                Some(path) => info!("📄 Loaded configuration from {}", path.display()),
                None => info!("📄 No config file found, using defaults and environment"),
            }
            log_system_info();
            crawl(&config).await
        }
        Commands::Summary { dir } => {
            let dir = dir.unwrap_or_else(|| config.io.output_dir.clone());
            let report = summarize_dir(&dir)
                .await
                .with_context(|| format!("Failed to summarize {}", dir.display()))?;
            println!("{report}");
            Ok(())
        }
    }
}

async fn crawl(config: &AppConfig) -> Result<()> {
    let ids = load_item_ids(&config.io.input_file, &config.io.id_column, config.io.limit)
        .with_context(|| format!("Failed to read IDs from {}", config.io.input_file.display()))?;
    if ids.is_empty() {
        warn!("⚠️ No item IDs found in {:?}, nothing to do", config.io.input_file);
        return Ok(());
    }

    let (Some(batch_size), Some(concurrency)) = (
        NonZeroUsize::new(config.batch.batch_size),
        NonZeroUsize::new(config.batch.concurrency),
    ) else {
        bail!("batch_size and concurrency must be greater than 0");
    };

    let runner = BatchRunner::new(
        batch_size,
        Dispatcher::new(concurrency),
        Arc::new(HttpClientFactory::new(config.fetch.timeout())),
        Arc::new(JsonBatchWriter::new(&config.io.output_dir)),
        Arc::new(TokioPacer),
        FetcherSettings::from_app_config(config),
    )
    .with_batch_delay(config.batch.batch_delay());

    let report = runner.run(&ids).await.context("Crawl aborted")?;
    info!(
        "🎉 Done: {} batches written to {:?} ({} ok, {} failed)",
        report.batches, config.io.output_dir, report.successes, report.failures
    );
    Ok(())
}

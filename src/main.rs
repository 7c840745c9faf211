//! crosslist CLI

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crosslist::application::action_engine::{ActionEngine, TargetSelectors};
use crosslist::application::event_bus::EventBus;
use crosslist::application::orchestrator::PipelineOrchestrator;
use crosslist::application::scanner::SoldItemsScanner;
use crosslist::infrastructure::config::ConfigManager;
use crosslist::infrastructure::csv_export;
use crosslist::infrastructure::logging;
use crosslist::infrastructure::store::{SqliteStore, WorkItemStore};
use crosslist::infrastructure::tab::TabCoordinator;
use crosslist::infrastructure::webdriver::WebDriverBackend;

#[derive(Parser)]
#[command(name = "crosslist", about = "Cross-marketplace listing pipeline", version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List products from a file of source product URLs
    List {
        /// File with one product URL per line
        urls_file: PathBuf,
    },
    /// Scan a seller's sold items and export them as CSV
    Research {
        /// Seller username or seller page URL
        seller: String,
        /// Output CSV path
        #[arg(short, long, default_value = "sold_items.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = ConfigManager::new()?.initialize_on_first_run().await?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current step then stopping");
            ctrl_c_cancel.cancel();
        }
    });

    let driver = Arc::new(WebDriverBackend::connect(&config.advanced.webdriver_url).await?);
    let tabs = Arc::new(TabCoordinator::new(driver.clone()));
    let bus = EventBus::new();

    let result = match cli.command {
        Command::List { urls_file } => {
            let contents = tokio::fs::read_to_string(&urls_file)
                .await
                .with_context(|| format!("failed to read {}", urls_file.display()))?;
            let urls: Vec<String> = contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect();
            anyhow::ensure!(!urls.is_empty(), "no urls in {}", urls_file.display());

            let db_path = ConfigManager::default_db_path()?;
            let store = WorkItemStore::new(Arc::new(SqliteStore::open(&db_path).await?));
            let engine = ActionEngine::new(
                TargetSelectors::default(),
                Duration::from_millis(config.user.settle_delay_ms),
            );
            let orchestrator =
                PipelineOrchestrator::new(tabs, store, bus, engine, config.clone());

            let summary = orchestrator.run_batch(&urls, cancel.clone()).await?;
            info!(
                listed = summary.listed,
                failed = summary.failed,
                skipped = summary.skipped,
                "batch finished"
            );
            Ok(())
        }
        Command::Research { seller, output } => {
            let scanner = SoldItemsScanner::new(
                tabs,
                bus,
                config.user.research.clone(),
                config.advanced.target_search_base.clone(),
                Duration::from_secs(config.user.tab_load_timeout_seconds),
            );
            let items = scanner.scan(&seller, cancel.clone()).await?;
            csv_export::write_sold_items(&output, &items)?;
            info!(products = items.len(), output = %output.display(), "research exported");
            Ok(())
        }
    };

    driver.shutdown().await;
    result
}

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use auction_scraper::config::Config;
use auction_scraper::enrich::ValuationJob;
use auction_scraper::fetch::ProxyClient;
use auction_scraper::logging;
use auction_scraper::pipeline::Ingester;
use auction_scraper::retry::{with_retry, RetryPolicy};
use auction_scraper::server;
use auction_scraper::sources::{find_source, SourceSpec, SOURCES};
use auction_scraper::storage::{SqliteStorage, Storage};

#[derive(Parser)]
#[command(name = "auction_scraper")]
#[command(about = "Sheriff-sale auction listing scraper")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the listing sources and upsert new records
    Ingest {
        /// Specific sources to run (comma-separated). Default: all
        #[arg(long)]
        sources: Option<String>,
    },
    /// Look up valuations for recently created records
    Enrich,
    /// Serve the read API
    Serve,
    /// Run ingestion followed by enrichment
    Run {
        /// Specific sources to run (comma-separated). Default: all
        #[arg(long)]
        sources: Option<String>,
    },
}

fn selected_sources(arg: Option<String>) -> Vec<&'static SourceSpec> {
    match arg {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter_map(|id| match find_source(id) {
                Some(source) => Some(source),
                None => {
                    warn!("Unknown source specified: {}", id);
                    println!("⚠️  Unknown source: {id}");
                    None
                }
            })
            .collect(),
        None => SOURCES.iter().collect(),
    }
}

async fn run_ingestion(
    sources: &[&'static SourceSpec],
    storage: Arc<dyn Storage>,
    config: &Config,
) {
    let ingester = Ingester::new(storage, config.clone());
    let policy = RetryPolicy::new(
        config.retry.source_max_attempts,
        Duration::from_secs(config.retry.source_delay_seconds),
    );

    // One source is fully processed before the next begins; a failed source
    // never aborts the whole run.
    for source in sources {
        match with_retry(policy, source.id, || ingester.run_source(source)).await {
            Ok(outcome) => {
                println!("\n📊 Ingestion results for {}:", source.id);
                println!("   Rows scanned: {}", outcome.rows_scanned);
                println!("   New records: {}", outcome.new_records);
                println!("   Upserted: {}", outcome.upserted);
                println!("   Errors: {}", outcome.errors.len());

                if !outcome.errors.is_empty() {
                    warn!(
                        "{} errors encountered while ingesting {}",
                        outcome.errors.len(),
                        source.id
                    );
                    for error in &outcome.errors {
                        println!("   - {error}");
                    }
                }
            }
            Err(exhausted) => {
                // No data this run; the source is skipped, not empty.
                error!("Skipping source {} this run: {}", source.id, exhausted);
                println!("⚠️  Skipping {} this run: {exhausted}", source.id);
            }
        }
    }
}

async fn run_enrichment(storage: Arc<dyn Storage>, config: &Config) {
    let proxy = match ProxyClient::new(&config.fetch) {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("Cannot start valuation job: {}", e);
            println!("❌ Cannot start valuation job: {e}");
            return;
        }
    };
    let policy = RetryPolicy::new(
        config.retry.detail_max_attempts,
        Duration::from_secs(config.retry.detail_delay_seconds),
    );
    let job = ValuationJob::new(storage, proxy, policy);

    match job.run().await {
        Ok(outcome) => {
            println!("\n💰 Valuation results:");
            println!("   Examined: {}", outcome.examined);
            println!("   Updated: {}", outcome.updated);
            println!("   Skipped: {}", outcome.skipped);
        }
        Err(e) => {
            error!("Valuation job failed: {}", e);
            println!("❌ Valuation job failed: {e}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load_or_default();
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(&config.storage.db_path)?);

    match cli.command {
        Commands::Ingest { sources } => {
            println!("🔄 Running ingestion pipeline...");
            let sources = selected_sources(sources);
            run_ingestion(&sources, storage, &config).await;
        }
        Commands::Enrich => {
            println!("💰 Running valuation enrichment...");
            run_enrichment(storage, &config).await;
        }
        Commands::Serve => {
            println!("🌐 Starting read API on {}...", config.server.bind_addr);
            server::run_server(storage, &config.server).await?;
        }
        Commands::Run { sources } => {
            println!("🚀 Running full pipeline (ingestion + enrichment)...");
            let sources = selected_sources(sources);
            run_ingestion(&sources, storage.clone(), &config).await;
            run_enrichment(storage, &config).await;
        }
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use listing_sync::catalog::BrokerageConnector;
use listing_sync::store::PgStore;
use listing_sync::{Orchestrator, SyncConfig, SyncRequest};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Pull an operator's rental catalog from the brokerage API into the local store.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Operator API key for the brokerage
    #[arg(long, env = "CATALOG_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Maximum listings to sync (clamped to 1..=500)
    #[arg(long, env = "SYNC_LISTING_LIMIT")]
    limit: Option<usize>,

    /// Auth identity of the owner running the sync
    #[arg(long)]
    auth_id: Option<String>,

    /// Email of the owner running the sync
    #[arg(long)]
    email: Option<String>,

    /// Also write the summary to this file
    #[arg(long)]
    output: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = SyncConfig::from_env().context("Failed to load configuration")?;

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set")?;
    let store = PgStore::connect(&database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;

    let connector = BrokerageConnector::new(&config).context("Failed to create catalog client")?;
    let request = SyncRequest {
        api_key: cli.api_key,
        listing_limit: cli.limit.unwrap_or(config.listing_limit),
        auth_id: cli.auth_id,
        auth_email: cli.email,
    };
    let orchestrator = Orchestrator::new(store, connector, config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            on_signal.cancel();
        }
    });

    info!(limit = request.listing_limit, "Starting catalog sync");
    let result = orchestrator
        .run_sync_cancellable(&request, cancel)
        .await
        .context("Sync failed")?;

    let json = serde_json::to_string_pretty(&result)?;
    println!("{json}");

    if let Some(path) = cli.output {
        tokio::fs::write(&path, &json).await?;
        info!("Saved summary to {}", path);
    }

    if !result.errors.is_empty() {
        warn!(errors = result.errors.len(), "Sync finished with entity errors");
    }

    Ok(())
}

//! Exchange server binary
//!
//! Config is read from the first argument or `EXCHANGE_CONFIG` when either is
//! set, otherwise from `EXCHANGE_*` environment variables.

use exchange_core::{Config, Exchange, RequestContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting MRX exchange");

    let config = match std::env::args()
        .nth(1)
        .or_else(|| std::env::var("EXCHANGE_CONFIG").ok())
    {
        Some(path) => {
            tracing::info!("Loading config from {}", path);
            Config::from_file(path)?
        }
        None => Config::from_env()?,
    };

    let exchange = Exchange::open(config).await?;
    tracing::info!("Exchange opened successfully");

    match exchange.market_snapshot() {
        Ok(market) => tracing::info!(
            inr_pool = %market.inr_pool,
            mrx_pool = %market.mrx_pool,
            price = %market.price,
            above_floor = market.above_floor,
            "Market loaded"
        ),
        Err(e) => tracing::warn!("Market unavailable: {}", e),
    }

    let reconciliation = exchange.mrx_reconciliation()?;
    if !reconciliation.reconciled {
        tracing::warn!(
            discrepancy = %reconciliation.discrepancy,
            "MRX supply does not reconcile"
        );
    }

    let health = exchange.system_health(&RequestContext::new("system"))?;
    tracing::info!(
        "Health: {}",
        serde_json::to_string(&health).unwrap_or_default()
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down exchange");
    exchange.shutdown().await?;
    Ok(())
}

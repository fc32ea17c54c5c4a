use std::{str::FromStr, sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    api::handler::AppState,
    config::Config,
    error::{AppError, AppResult},
    ledger::LedgerRepository,
    queue::JobQueue,
    settlement::{
        HostedRailProvider, ProviderKind, SettlementEngine, SettlementProvider, StubRailProvider,
    },
};

/// Initialize logging and tracing; shared by all three binaries.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,instant_refund=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ database initialized");
    Ok(pool)
}

/// Resolve the settlement rail adapter once, at configuration time. The
/// request path never selects a provider.
pub fn build_provider(config: &Config) -> AppResult<Arc<dyn SettlementProvider>> {
    let kind = ProviderKind::from_str(&config.settlement_provider).map_err(AppError::Config)?;

    let provider: Arc<dyn SettlementProvider> = match kind {
        ProviderKind::Hosted => {
            let base_url = config
                .hosted_rail_base_url
                .clone()
                .ok_or_else(|| {
                    AppError::Config("HOSTED_RAIL_BASE_URL not set for hosted provider".to_string())
                })?;
            Arc::new(HostedRailProvider::new(
                base_url,
                config.hosted_rail_api_key.clone(),
                config.rail_network.clone(),
                config.confirmations_required,
            ))
        }
        ProviderKind::Stub => Arc::new(StubRailProvider::new(config.rail_network.clone())),
    };

    info!(
        provider = %config.settlement_provider,
        network = %config.rail_network,
        "✓ settlement provider registered"
    );
    Ok(provider)
}

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("initializing application components...");

    let pool = initialize_database(&config.database_url).await?;

    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    let queue = Arc::new(JobQueue::new(pool));
    let provider = build_provider(config)?;
    let engine = Arc::new(SettlementEngine::new(
        ledger.clone(),
        queue.clone(),
        provider,
    ));

    Ok(AppState {
        ledger,
        queue,
        engine,
        rail_network: Arc::from(config.rail_network.as_str()),
    })
}

use instant_refund::{
    bootstrap::init_tracing,
    config::SignerConfig,
    signing::{signer_app, SignerState},
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("starting delegated signer...");

    let config = SignerConfig::from_env()?;
    let state = SignerState::from_config(&config)?;
    let app = signer_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("signer listening on: {}", config.bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}

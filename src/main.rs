use instant_refund::{
    bootstrap::{init_tracing, initialize_app_state},
    config::Config,
    server::{create_app, run_server},
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("starting instant-refund API server...");

    let config = Config::from_env()?;
    let state = initialize_app_state(&config).await?;
    let app = create_app(state);

    run_server(app, &config.bind_address).await
}

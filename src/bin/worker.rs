use std::{sync::Arc, time::Duration};

use instant_refund::{
    bootstrap::{build_provider, init_tracing, initialize_database},
    config::Config,
    ledger::LedgerRepository,
    queue::JobQueue,
    settlement::SettlementWorker,
    signing::SignerClient,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("starting settlement worker...");

    let config = Config::from_env()?;
    let pool = initialize_database(&config.database_url).await?;

    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    let queue = Arc::new(JobQueue::new(pool));
    let provider = build_provider(&config)?;
    let signer = SignerClient::new(
        config.signer_url.clone(),
        config.signer_shared_secret.clone(),
    );

    let lease = Duration::from_secs(config.job_lease_seconds);
    tokio::spawn(SettlementWorker::run_reaper(queue.clone(), lease));

    let worker = SettlementWorker::new(&config, ledger, queue, provider, signer);
    worker.run().await;

    Ok(())
}

use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{
    create_instant_refund, get_refund, health_check, list_refund_events, refresh, AppState,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/v1/refunds",
            Router::new()
                .route("/instant", post(create_instant_refund))
                .route("/refresh", post(refresh))
                .route("/:refund_id", get(get_refund))
                .route("/:refund_id/events", get(list_refund_events)),
        )
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/pool", get(handlers::handle_pool))
        .route("/accounts/{id}/quota", get(handlers::handle_account_quota))
        .route("/anomalies", get(handlers::handle_anomalies))
        .route("/rates", get(handlers::handle_rates))
        .route("/projection", get(handlers::handle_projection))
        .route("/sessions", post(handlers::handle_session_submit))
        .route("/rates/apply", post(handlers::handle_rates_apply))
        .route("/rates/propose", post(handlers::handle_rates_propose))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Products
        .route("/api/products", get(routes::products::list_products))
        // Personalization sessions
        .route("/api/sessions", post(routes::sessions::create_session))
        .route(
            "/api/sessions/{id}/messages",
            post(routes::sessions::submit_message),
        )
        // Checkout
        .route("/api/checkout", post(routes::checkout::begin_checkout))
        .route(
            "/api/checkout/confirm",
            post(routes::checkout::confirm_payment),
        )
        // Orders
        .route("/api/orders/{id}/status", get(routes::orders::get_status))
        .route("/api/orders/{id}/stages", post(routes::orders::report_stage))
        .route(
            "/api/orders/{id}/remake",
            post(routes::orders::request_remake),
        )
        .route(
            "/api/orders/{id}/delivered",
            post(routes::orders::mark_delivered),
        )
        // Gift codes
        .route("/api/gift-codes", post(routes::giftcodes::issue_gift_code))
        .layer(cors)
        .with_state(app_state)
}

/// Start the API server.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("lessonsmith API listening on http://localhost:{port}");

    axum::serve(listener, app).await?;
    Ok(())
}

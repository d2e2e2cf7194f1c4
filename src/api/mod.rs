//! HTTP surface: ingestion plus the privileged administrative routes.
//! Every admin route is a direct passthrough to the traffic service.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ApiError;
use crate::service::TrafficService;
use crate::utils::create_request_span;

/// Shared state of every handler
pub struct AppState {
    pub service: Arc<TrafficService>,
    /// Bearer token for `/admin` and `/ingest`
    pub admin_token: String,
    /// Actor recorded on bans added through the API
    pub admin_actor_id: i64,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let privileged = Router::new()
        .route("/admin/bans", post(handlers::add_ban))
        .route(
            "/admin/bans/:ip",
            get(handlers::get_ban).delete(handlers::remove_ban),
        )
        .route("/admin/top", get(handlers::top_ips))
        .route(
            "/admin/whitelist",
            get(handlers::list_whitelist).post(handlers::add_whitelist),
        )
        .route("/admin/whitelist/:ip", delete(handlers::remove_whitelist))
        .route("/ingest", post(handlers::ingest))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(privileged)
        .layer(middleware::from_fn(request_span))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

async fn require_token<B>(
    State(state): State<Arc<AppState>>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        // An empty configured token locks the surface instead of opening it
        Some(token) if !state.admin_token.is_empty() && token == state.admin_token => {
            Ok(next.run(request).await)
        }
        _ => Err(ApiError::Unauthorized),
    }
}

async fn request_span<B>(request: Request<B>, next: Next<B>) -> Response {
    let span = create_request_span(&Uuid::new_v4().to_string());
    next.run(request).instrument(span).await
}

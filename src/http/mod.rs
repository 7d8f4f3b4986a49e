//! Admin HTTP API
//!
//! Every route except `/health` requires `Authorization: Bearer <token>`.
//! With no token configured the admin routes refuse all requests.

pub mod searches;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use crate::scheduler::SharedScraper;
use crate::storage::SqliteStore;

/// Shared state handed to every handler.
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub scraper: SharedScraper,
    pub api_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

/// Assemble the admin router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/searches",
            post(searches::create_search).get(searches::list_searches),
        )
        .route("/searches/{id}/seen", get(searches::list_seen))
        .route("/scrape", post(searches::trigger_scrape))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health_handler))
        .merge(admin)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    if !check_auth(state.api_token.as_deref(), request.headers()) {
        warn!(path = %request.uri().path(), "Rejected unauthorized admin request");
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "Unauthorized. Set 'Authorization: Bearer <your-token>' header.",
        ));
    }
    Ok(next.run(request).await)
}

fn check_auth(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected.filter(|t| !t.is_empty()) else {
        return false;
    };
    extract_bearer(headers)
        .map(|token| token == expected)
        .unwrap_or(false)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

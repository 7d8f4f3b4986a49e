//! Saved-search management and on-demand scraping.
//!
//! Request:  `POST /searches {"url": "https://www.vinted.co.uk/catalog?search_text=..."}`
//! Response: `{"id": 1}`
//! Error:    `{"error": "..."}`

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::http::{api_error, ApiResult, AppState};
use crate::models::{SavedSearch, SeenRecord};
use crate::pipeline::orchestrator::RunReport;
use crate::scheduler;
use crate::scrapers::SearchParams;
use crate::storage::SearchStore;

#[derive(Debug, Deserialize)]
pub struct CreateSearchRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSearchReply {
    pub id: i64,
}

/// POST /searches: save a search from a marketplace catalog URL.
pub async fn create_search(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateSearchRequest>, JsonRejection>,
) -> ApiResult<CreateSearchReply> {
    let Json(req) =
        payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid request body: {e}")))?;

    let url = req
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "url is required"))?;

    let params = SearchParams::from_catalog_url(&url).map_err(|e| {
        warn!(%url, error = %e, "Rejected catalog URL");
        api_error(StatusCode::BAD_REQUEST, format!("invalid catalog url: {e}"))
    })?;

    let search = SavedSearch::new(params).with_original_url(url);
    let id = state.store.create_search(&search).map_err(|e| {
        error!(error = %e, "Failed to save search");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    info!(search_id = id, name = %search.name, "Saved search created");
    Ok(Json(CreateSearchReply { id }))
}

/// GET /searches
pub async fn list_searches(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SavedSearch>> {
    state.store.list_searches().map(Json).map_err(|e| {
        error!(error = %e, "Failed to list searches");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// GET /searches/{id}/seen: ledger entries for one search.
pub async fn list_seen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<SeenRecord>> {
    let internal = |e: crate::storage::StoreError| {
        error!(search_id = id, error = %e, "Failed to read seen items");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    };

    if state.store.get_search(id).map_err(internal)?.is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("search {id} not found"),
        ));
    }

    state.store.seen_records(id).map(Json).map_err(internal)
}

/// POST /scrape: run one pass now, after any pass already in progress.
pub async fn trigger_scrape(State(state): State<Arc<AppState>>) -> ApiResult<RunReport> {
    info!("Manual scrape requested");
    match scheduler::run_once(state.scraper.clone()).await {
        Ok(result) => {
            info!(summary = %result, "Manual scrape finished");
            Ok(Json(result.report()))
        }
        Err(e) => {
            error!(error = %e, "Manual scrape failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

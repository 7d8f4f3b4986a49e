use reqwest::StatusCode;
use thiserror::Error;

use crate::scrapers::types::ParamsError;

/// Errors returned by a listing fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// The search parameters cannot be turned into a request URL.
    #[error("failed to build API URL: {0}")]
    BuildUrl(#[from] ParamsError),

    /// The remote could not be reached.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Still unauthorized after one session bootstrap and retry.
    #[error("unauthorized after session refresh: {0}")]
    Auth(String),

    /// Any other non-success status.
    #[error("API request failed with status: {0}")]
    RemoteStatus(StatusCode),

    /// The body is not the expected JSON document.
    #[error("failed to decode API response: {0}")]
    Decode(#[source] serde_json::Error),
}

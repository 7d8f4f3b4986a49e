use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scrapers::types::SearchParams;

/// Asking price as reported by the marketplace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Price {
    pub amount: String,
    pub currency_code: String,
}

/// A single marketplace listing returned by a catalog search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: u64,
    pub title: String,
    pub price: Price,
    pub size_title: Option<String>,
    pub brand_title: Option<String>,
    pub url: String,
    pub photo_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// A named set of search parameters polled on every run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedSearch {
    pub id: i64,
    pub name: String,
    pub params: SearchParams,
    pub original_url: Option<String>,
    pub active: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedSearch {
    /// Build an unsaved search; the name defaults to the free-text query.
    pub fn new(params: SearchParams) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: params.search_text().to_string(),
            params,
            original_url: None,
            active: true,
            last_checked: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_original_url(mut self, url: impl Into<String>) -> Self {
        self.original_url = Some(url.into());
        self
    }
}

/// Ledger entry recording that a listing was already notified for a search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeenRecord {
    pub search_id: i64,
    pub listing_id: u64,
    pub seen_at: DateTime<Utc>,
}

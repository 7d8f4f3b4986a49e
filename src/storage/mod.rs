pub mod db;
pub mod sqlite;

pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::models::SavedSearch;

/// Persistence failures from the search store or the seen-item ledger
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to (de)serialize search params: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp {value:?} in column {column}")]
    InvalidTimestamp { column: &'static str, value: String },

    #[error("listing id {0} does not fit in an SQLite integer")]
    IdOutOfRange(u64),

    #[error("database connection lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Saved searches, as read by the scraper and written by the admin API
pub trait SearchStore: Send + Sync {
    fn create_search(&self, search: &SavedSearch) -> Result<i64>;

    fn get_search(&self, id: i64) -> Result<Option<SavedSearch>>;

    /// All searches ordered by id.
    fn list_searches(&self) -> Result<Vec<SavedSearch>>;

    fn list_active_searches(&self) -> Result<Vec<SavedSearch>> {
        Ok(self
            .list_searches()?
            .into_iter()
            .filter(|search| search.active)
            .collect())
    }
}

/// Durable record of which listings were already notified for which search
///
/// `is_seen` and `mark_seen` are individually atomic but not a transaction
/// together. Once `mark_seen` succeeds, `is_seen` for the same pair stays
/// true; marking a pair twice is a no-op.
pub trait SeenLedger: Send + Sync {
    fn is_seen(&self, search_id: i64, listing_id: u64) -> Result<bool>;

    fn mark_seen(&self, search_id: i64, listing_id: u64) -> Result<()>;
}

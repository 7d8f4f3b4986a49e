use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::models::{SavedSearch, SeenRecord};
use crate::storage::db::init_db;
use crate::storage::{Result, SearchStore, SeenLedger, StoreError};

const SEARCH_COLUMNS: &str =
    "id, name, search_params, original_url, last_checked, active, created_at, updated_at";

type SearchRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    String,
    String,
);

/// SQLite-backed search store and seen-item ledger
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and run the schema bootstrap.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Ledger entries for one search, oldest first.
    pub fn seen_records(&self, search_id: i64) -> Result<Vec<SeenRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT search_id, item_id, seen_at FROM seen_items
             WHERE search_id = ?1 ORDER BY seen_at, item_id",
        )?;
        let rows = stmt
            .query_map([search_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(search_id, item_id, seen_at)| {
                Ok(SeenRecord {
                    search_id,
                    listing_id: item_id as u64,
                    seen_at: parse_timestamp("seen_at", &seen_at)?,
                })
            })
            .collect()
    }
}

fn read_search_row(row: &Row<'_>) -> rusqlite::Result<SearchRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn into_saved_search(row: SearchRow) -> Result<SavedSearch> {
    let (id, name, params_json, original_url, last_checked, active, created_at, updated_at) = row;
    Ok(SavedSearch {
        id,
        name,
        params: serde_json::from_str(&params_json)?,
        original_url,
        active,
        last_checked: last_checked
            .map(|value| parse_timestamp("last_checked", &value))
            .transpose()?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp {
            column,
            value: value.to_string(),
        })
}

fn to_sql_id(listing_id: u64) -> Result<i64> {
    i64::try_from(listing_id).map_err(|_| StoreError::IdOutOfRange(listing_id))
}

impl SearchStore for SqliteStore {
    fn create_search(&self, search: &SavedSearch) -> Result<i64> {
        let params_json = serde_json::to_string(&search.params)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO saved_searches
             (name, search_params, original_url, last_checked, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                search.name,
                params_json,
                search.original_url,
                search.last_checked.map(|dt| dt.to_rfc3339()),
                search.active,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(search_id = id, name = %search.name, "Saved search created");
        Ok(id)
    }

    fn get_search(&self, id: i64) -> Result<Option<SavedSearch>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {SEARCH_COLUMNS} FROM saved_searches WHERE id = ?1"),
                [id],
                read_search_row,
            )
            .optional()?;
        row.map(into_saved_search).transpose()
    }

    fn list_searches(&self) -> Result<Vec<SavedSearch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SEARCH_COLUMNS} FROM saved_searches ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], read_search_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(into_saved_search).collect()
    }
}

impl SeenLedger for SqliteStore {
    fn is_seen(&self, search_id: i64, listing_id: u64) -> Result<bool> {
        let item_id = to_sql_id(listing_id)?;
        let conn = self.lock()?;
        let seen = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM seen_items WHERE search_id = ?1 AND item_id = ?2)",
            params![search_id, item_id],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(seen)
    }

    fn mark_seen(&self, search_id: i64, listing_id: u64) -> Result<()> {
        let item_id = to_sql_id(listing_id)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO seen_items (search_id, item_id, seen_at)
             VALUES (?1, ?2, ?3)",
            params![search_id, item_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::types::SearchParams;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("in-memory db")
    }

    fn search(text: &str) -> SavedSearch {
        SavedSearch::new(SearchParams::new(text).unwrap())
    }

    #[test]
    fn create_and_get_search() {
        let store = store();
        let params = SearchParams::new("test search")
            .unwrap()
            .brand_ids([53])
            .price_range(None, Some(40.0))
            .currency("GBP");
        let saved = SavedSearch::new(params.clone())
            .with_original_url("https://www.vinted.co.uk/catalog?search_text=test+search");

        let before = Utc::now();
        let id = store.create_search(&saved).unwrap();
        let after = Utc::now();
        assert_eq!(id, 1);

        let loaded = store.get_search(id).unwrap().expect("search exists");
        assert_eq!(loaded.id, 1);
        assert_eq!(loaded.name, "test search");
        assert_eq!(loaded.params, params);
        assert_eq!(loaded.original_url, saved.original_url);
        assert!(loaded.active);
        assert_eq!(loaded.last_checked, None);
        assert!(loaded.created_at >= before && loaded.created_at <= after);
        assert_eq!(loaded.created_at, loaded.updated_at);
    }

    #[test]
    fn missing_search_is_none() {
        assert!(store().get_search(42).unwrap().is_none());
    }

    #[test]
    fn lists_searches_in_id_order_and_filters_inactive() {
        let store = store();
        store.create_search(&search("test search")).unwrap();
        let mut paused = search("paused search");
        paused.active = false;
        store.create_search(&paused).unwrap();
        store.create_search(&search("another test search")).unwrap();

        let all = store.list_searches().unwrap();
        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let active = store.list_active_searches().unwrap();
        assert_eq!(active.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn mark_then_is_seen() {
        let store = store();
        let search_id = store.create_search(&search("test search")).unwrap();

        store.mark_seen(search_id, 12345).unwrap();

        assert!(store.is_seen(search_id, 12345).unwrap());
        assert!(!store.is_seen(search_id, 1234).unwrap());
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let store = store();
        let search_id = store.create_search(&search("test search")).unwrap();

        store.mark_seen(search_id, 7).unwrap();
        store.mark_seen(search_id, 7).unwrap();

        assert!(store.is_seen(search_id, 7).unwrap());
        assert_eq!(store.seen_records(search_id).unwrap().len(), 1);
    }

    #[test]
    fn ledger_is_keyed_per_search() {
        let store = store();
        let first = store.create_search(&search("jackets")).unwrap();
        let second = store.create_search(&search("coats")).unwrap();

        store.mark_seen(first, 99).unwrap();

        assert!(store.is_seen(first, 99).unwrap());
        assert!(!store.is_seen(second, 99).unwrap());

        store.mark_seen(second, 99).unwrap();
        assert!(store.is_seen(second, 99).unwrap());
    }

    #[test]
    fn oversized_listing_id_is_rejected() {
        let store = store();
        let search_id = store.create_search(&search("jackets")).unwrap();
        assert!(matches!(
            store.mark_seen(search_id, u64::MAX),
            Err(StoreError::IdOutOfRange(u64::MAX))
        ));
    }
}

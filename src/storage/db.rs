use rusqlite::{Connection, Result};

/// Initialise the search and ledger tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    create_saved_searches_table(conn)?;
    create_seen_items_table(conn)?;
    Ok(())
}

fn create_saved_searches_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS saved_searches (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            name          TEXT    NOT NULL,
            search_params TEXT    NOT NULL,   -- JSON-encoded SearchParams
            original_url  TEXT,
            last_checked  TEXT,               -- RFC 3339 or NULL
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL
        );",
    )
}

/// One row per (search, listing) that has already been notified.
fn create_seen_items_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS seen_items (
            search_id   INTEGER NOT NULL,
            item_id     INTEGER NOT NULL,
            seen_at     TEXT    NOT NULL,
            PRIMARY KEY (search_id, item_id),
            FOREIGN KEY (search_id) REFERENCES saved_searches(id) ON DELETE CASCADE
        );",
    )
}

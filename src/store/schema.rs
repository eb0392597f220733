//! SQLite DDL for the goal store.

use rusqlite::Connection;

/// Schema version stamped into fresh databases.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the goal database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One goal per user per calendar day.
CREATE TABLE IF NOT EXISTS user_goals (
    user_id     TEXT NOT NULL,
    goal_date   TEXT NOT NULL,      -- YYYY-MM-DD
    goal_points INTEGER NOT NULL DEFAULT 0,
    completed   INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, goal_date)
);

-- Points accumulated per user per calendar day.
CREATE TABLE IF NOT EXISTS daily_points (
    user_id      TEXT NOT NULL,
    logged_date  TEXT NOT NULL,     -- YYYY-MM-DD
    total_points INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, logged_date)
);
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the schema version, `None` when unset.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

//! Database schema definitions.
//!
//! The store holds two groups of tables in one database so that every
//! SyncInfo mutation commits together with its target mutation:
//!
//! - `sync_*` - provenance: what was synchronized, from where, and when
//! - `target_*` - the minimal target repository the engine writes into

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema.
///
/// Timestamps written by the engine are INTEGER Unix milliseconds; source
/// timestamps are stored as REAL exactly as the source reports them.
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- SyncInfo
-- ====================

-- Files: one row per design file ever synchronized
CREATE TABLE IF NOT EXISTS sync_files (
    id INTEGER PRIMARY KEY,
    unique_name TEXT NOT NULL UNIQUE,
    source_name TEXT NOT NULL,
    last_save_time REAL NOT NULL DEFAULT 0,
    last_modified INTEGER NOT NULL DEFAULT 0,
    file_size INTEGER NOT NULL DEFAULT 0,
    id_policy TEXT NOT NULL DEFAULT 'by_stable_id'
);

-- Models: scoped by file
CREATE TABLE IF NOT EXISTS sync_models (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL,
    source_id INTEGER NOT NULL,
    source_name TEXT NOT NULL,
    target_id INTEGER NOT NULL UNIQUE,
    hash BLOB NOT NULL,
    contents_last_modified REAL,
    FOREIGN KEY (file_id) REFERENCES sync_files(id) ON DELETE CASCADE,
    UNIQUE(file_id, source_id)
);

CREATE INDEX IF NOT EXISTS idx_sync_models_file ON sync_models(file_id);

-- Elements: scoped by model; identity is a stable id, a content hash,
-- or a free-form identifier
CREATE TABLE IF NOT EXISTS sync_elements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id INTEGER NOT NULL,
    identity_kind TEXT NOT NULL,
    source_id INTEGER,
    freeform_id TEXT,
    target_id INTEGER NOT NULL UNIQUE,
    last_modified REAL NOT NULL DEFAULT 0,
    hash BLOB NOT NULL,
    FOREIGN KEY (model_id) REFERENCES sync_models(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sync_elements_model ON sync_elements(model_id);
CREATE INDEX IF NOT EXISTS idx_sync_elements_source
    ON sync_elements(model_id, source_id) WHERE identity_kind = 'stable_id';
CREATE INDEX IF NOT EXISTS idx_sync_elements_freeform
    ON sync_elements(model_id, freeform_id) WHERE identity_kind = 'freeform';

-- Views: scoped by file
CREATE TABLE IF NOT EXISTS sync_views (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL,
    source_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    target_id INTEGER NOT NULL UNIQUE,
    last_modified REAL NOT NULL DEFAULT 0,
    hash BLOB NOT NULL,
    FOREIGN KEY (file_id) REFERENCES sync_files(id) ON DELETE CASCADE,
    UNIQUE(file_id, source_id)
);

-- Discards: elements deliberately not converted
-- keyed the same way as sync_elements
CREATE TABLE IF NOT EXISTS sync_discards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id INTEGER NOT NULL,
    identity_kind TEXT NOT NULL,
    identity_key TEXT NOT NULL,
    FOREIGN KEY (model_id) REFERENCES sync_models(id) ON DELETE CASCADE,
    UNIQUE(model_id, identity_kind, identity_key)
);

-- External resources referenced by a file's elements
CREATE TABLE IF NOT EXISTS sync_resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL,
    uri TEXT NOT NULL,
    last_modified REAL NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    etag TEXT,
    FOREIGN KEY (file_id) REFERENCES sync_files(id) ON DELETE CASCADE,
    UNIQUE(file_id, uri)
);

-- Job-level values (root transform)
CREATE TABLE IF NOT EXISTS sync_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Runs
CREATE TABLE IF NOT EXISTS sync_runs (
    id TEXT PRIMARY KEY,
    mode TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'running',
    started_at INTEGER NOT NULL,
    finished_at INTEGER,
    inserted INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    unchanged INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sync_runs_started ON sync_runs(started_at DESC);

-- ====================
-- Target Repository
-- ====================

CREATE TABLE IF NOT EXISTS target_models (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}'
);

-- No cascades: children must be deleted before their parent.
CREATE TABLE IF NOT EXISTS target_elements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id INTEGER NOT NULL,
    parent_id INTEGER,
    class_name TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    FOREIGN KEY (model_id) REFERENCES target_models(id),
    FOREIGN KEY (parent_id) REFERENCES target_elements(id)
);

CREATE INDEX IF NOT EXISTS idx_target_elements_model ON target_elements(model_id);
CREATE INDEX IF NOT EXISTS idx_target_elements_parent ON target_elements(parent_id);

CREATE TABLE IF NOT EXISTS target_views (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}'
);

-- ====================
-- Audit Events
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_kind TEXT NOT NULL,
    target_id INTEGER,
    event_type TEXT NOT NULL,
    run_id TEXT NOT NULL,
    detail TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id);
CREATE INDEX IF NOT EXISTS idx_events_target ON events(record_kind, target_id);
";

/// Apply the schema to a database connection.
///
/// Sets pragmas, creates tables and runs pending migrations. Safe to call on
/// every open.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "sync_files",
            "sync_models",
            "sync_elements",
            "sync_views",
            "sync_discards",
            "sync_resources",
            "sync_meta",
            "sync_runs",
            "target_models",
            "target_elements",
            "target_views",
            "events",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_apply_schema_twice() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
    }
}

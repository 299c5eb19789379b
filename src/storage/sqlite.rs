//! SQLite storage implementation.
//!
//! [`SyncStore`] owns the connection. Every write goes through
//! [`SyncStore::mutate`], which pairs SyncInfo and target mutations with
//! their audit events in one IMMEDIATE transaction.

use crate::error::Result;
use crate::storage::events::{insert_event, EntityKind, Event, EventType};
use crate::storage::ids::TargetId;
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// SQLite-backed SyncInfo and target store.
#[derive(Debug)]
pub struct SyncStore {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to collect audit events that are written
/// before the transaction commits.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Run the mutation belongs to.
    pub run_id: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, run_id: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            run_id: run_id.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, kind: EntityKind, target: TargetId, event_type: EventType) {
        self.events
            .push(Event::new(kind, Some(target), event_type, &self.run_id));
    }

    /// Record an event with a free-form detail string.
    pub fn record_detail(
        &mut self,
        kind: EntityKind,
        target: Option<TargetId>,
        event_type: EventType,
        detail: impl Into<String>,
    ) {
        self.events
            .push(Event::new(kind, target, event_type, &self.run_id).with_detail(detail));
    }
}

/// Row counts across the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    pub files: usize,
    pub models: usize,
    pub elements: usize,
    pub views: usize,
    pub discards: usize,
    pub resources: usize,
    pub target_models: usize,
    pub target_elements: usize,
    pub target_views: usize,
}

/// Per-run tallies, persisted in `sync_runs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// One recorded run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub mode: String,
    pub status: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub counts: RunCounts,
}

fn count_to_sql(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn count_from_sql(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

impl SyncStore {
    /// Open a store at the given path, creating it if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a store with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, run_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, run_id);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    // ==================
    // Runs
    // ==================

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn begin_run(&mut self, run_id: &str, mode: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_runs (id, mode, status, started_at) VALUES (?1, ?2, 'running', ?3)",
            rusqlite::params![run_id, mode, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn finish_run(&mut self, run_id: &str, status: &str, counts: &RunCounts) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_runs
             SET status = ?2, finished_at = ?3, inserted = ?4, updated = ?5, unchanged = ?6,
                 deleted = ?7, skipped = ?8
             WHERE id = ?1",
            rusqlite::params![
                run_id,
                status,
                chrono::Utc::now().timestamp_millis(),
                count_to_sql(counts.inserted),
                count_to_sql(counts.updated),
                count_to_sql(counts.unchanged),
                count_to_sql(counts.deleted),
                count_to_sql(counts.skipped),
            ],
        )?;
        Ok(())
    }

    /// Most recently started run.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_run(&self) -> Result<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, mode, status, started_at, finished_at,
                        inserted, updated, unchanged, deleted, skipped
                 FROM sync_runs ORDER BY started_at DESC, rowid DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        mode: row.get(1)?,
                        status: row.get(2)?,
                        started_at: row.get(3)?,
                        finished_at: row.get(4)?,
                        counts: RunCounts {
                            inserted: count_from_sql(row.get(5)?),
                            updated: count_from_sql(row.get(6)?),
                            unchanged: count_from_sql(row.get(7)?),
                            deleted: count_from_sql(row.get(8)?),
                            skipped: count_from_sql(row.get(9)?),
                        },
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    // ==================
    // Counts
    // ==================

    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(count_from_sql(n))
        };

        Ok(StoreCounts {
            files: count("sync_files")?,
            models: count("sync_models")?,
            elements: count("sync_elements")?,
            views: count("sync_views")?,
            discards: count("sync_discards")?,
            resources: count("sync_resources")?,
            target_models: count("target_models")?,
            target_elements: count("target_elements")?,
            target_views: count("target_views")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::events::get_run_events;

    #[test]
    fn test_open_memory() {
        let store = SyncStore::open_memory().unwrap();
        assert_eq!(store.counts().unwrap().files, 0);
    }

    #[test]
    fn test_open_file_creates_parent() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("site.syncinfo.db");
        let store = SyncStore::open(&path).unwrap();
        drop(store);
        assert!(path.exists());
    }

    #[test]
    fn test_mutate_writes_events() {
        let mut store = SyncStore::open_memory().unwrap();
        store
            .mutate("insert_view", "run-1", |tx, ctx| {
                tx.execute("INSERT INTO target_views (name) VALUES ('Top')", [])?;
                ctx.record_event(
                    EntityKind::View,
                    TargetId(tx.last_insert_rowid()),
                    EventType::Inserted,
                );
                Ok(())
            })
            .unwrap();

        let events = get_run_events(store.conn(), "run-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Inserted);
    }

    #[test]
    fn test_mutate_rolls_back_on_error() {
        let mut store = SyncStore::open_memory().unwrap();
        let result: Result<()> = store.mutate("insert_view", "run-1", |tx, ctx| {
            tx.execute("INSERT INTO target_views (name) VALUES ('Top')", [])?;
            ctx.record_event(EntityKind::View, TargetId(1), EventType::Inserted);
            Err(Error::Other("transcoder failed".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.counts().unwrap().target_views, 0);
        assert!(get_run_events(store.conn(), "run-1").unwrap().is_empty());
    }

    #[test]
    fn test_run_records() {
        let mut store = SyncStore::open_memory().unwrap();
        assert!(store.last_run().unwrap().is_none());

        store.begin_run("run-1", "update").unwrap();
        let counts = RunCounts {
            inserted: 2,
            unchanged: 5,
            ..RunCounts::default()
        };
        store.finish_run("run-1", "completed", &counts).unwrap();

        let run = store.last_run().unwrap().unwrap();
        assert_eq!(run.id, "run-1");
        assert_eq!(run.status, "completed");
        assert_eq!(run.counts, counts);
        assert!(run.finished_at.is_some());
    }
}

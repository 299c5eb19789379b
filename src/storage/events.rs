//! Audit event storage and retrieval.
//!
//! Every applied insert, update, delete or discard leaves one event, written
//! in the same transaction as the mutation it describes.

use rusqlite::{Connection, Result};
use serde::Serialize;

use super::ids::TargetId;

/// Kinds of record an event can be about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Model,
    Element,
    View,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Model => "model",
            Self::Element => "element",
            Self::View => "view",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "file" => Self::File,
            "model" => Self::Model,
            "view" => Self::View,
            _ => Self::Element,
        }
    }
}

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Inserted,
    Updated,
    Deleted,
    Discarded,
    Moved,
    Registered,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Discarded => "discarded",
            Self::Moved => "moved",
            Self::Registered => "registered",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "inserted" => Self::Inserted,
            "deleted" => Self::Deleted,
            "discarded" => Self::Discarded,
            "moved" => Self::Moved,
            "registered" => Self::Registered,
            _ => Self::Updated,
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub record_kind: EntityKind,
    pub target_id: Option<TargetId>,
    pub event_type: EventType,
    pub run_id: String,
    pub detail: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(
        record_kind: EntityKind,
        target_id: Option<TargetId>,
        event_type: EventType,
        run_id: &str,
    ) -> Self {
        Self {
            id: 0,
            record_kind,
            target_id,
            event_type,
            run_id: run_id.to_string(),
            detail: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (record_kind, target_id, event_type, run_id, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            event.record_kind.as_str(),
            event.target_id,
            event.event_type.as_str(),
            event.run_id,
            event.detail,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get the events written by one run, oldest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_run_events(conn: &Connection, run_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, record_kind, target_id, event_type, run_id, detail, created_at
         FROM events
         WHERE run_id = ?1
         ORDER BY id",
    )?;

    let rows = stmt.query_map([run_id], |row| {
        Ok(Event {
            id: row.get(0)?,
            record_kind: EntityKind::parse(row.get::<_, String>(1)?.as_str()),
            target_id: row.get(2)?,
            event_type: EventType::parse(row.get::<_, String>(3)?.as_str()),
            run_id: row.get(4)?,
            detail: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;

    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_insert_and_list_events() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new(
            EntityKind::Element,
            Some(TargetId(7)),
            EventType::Inserted,
            "run-1",
        )
        .with_detail("source_id=42");
        insert_event(&conn, &event).unwrap();
        insert_event(
            &conn,
            &Event::new(EntityKind::Model, Some(TargetId(1)), EventType::Deleted, "run-2"),
        )
        .unwrap();

        let events = get_run_events(&conn, "run-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].record_kind, EntityKind::Element);
        assert_eq!(events[0].event_type, EventType::Inserted);
        assert_eq!(events[0].target_id, Some(TargetId(7)));
        assert_eq!(events[0].detail.as_deref(), Some("source_id=42"));
    }
}

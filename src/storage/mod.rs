//! SQLite storage layer.
//!
//! One database file holds the SyncInfo tables and the target repository:
//! - WAL mode
//! - IMMEDIATE transactions, one per applied record
//! - Audit events written inside the same transaction
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Connection owner and transaction protocol
//! - [`syncinfo`] - Source-to-target identity mapping
//! - [`target`] - Target repository tables

pub mod events;
mod ids;
pub mod migrations;
pub mod schema;
pub mod sqlite;
pub mod syncinfo;
pub mod target;

pub use ids::{FileSyncId, ModelSyncId, TargetId};
pub use sqlite::{MutationContext, RunCounts, RunRecord, StoreCounts, SyncStore};
pub use syncinfo::{
    DiscardEntry, ElementEntry, ElementFilter, ElementScope, FileEntry, ModelEntry, SourceIdentity, SyncInfo,
    ViewEntry,
};
pub use target::{ElementRow, TargetElement, TargetModel, TargetRepo, TargetView};

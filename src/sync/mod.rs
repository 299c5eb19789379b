//! Incremental synchronization.
//!
//! A run walks every loaded source file once:
//!
//! - **Classify**: [`ChangeDetector`] compares each record's current
//!   provenance with the SyncInfo store (Insert / Update / None)
//! - **Apply**: [`Converter`] transcodes changed records and writes the
//!   target mutation, SyncInfo entry and audit event in one transaction
//! - **Infer deletions**: anything stored under a visited file that was
//!   neither seen nor inside a skipped scope is deleted
//!
//! # Example
//!
//! ```ignore
//! use dgnsync::sync::{ConvertOptions, Converter, SyncMode};
//!
//! let arena = dgnsync::model::snapshot::load_arena(&sources)?;
//! let mut converter = Converter::new(&mut store, ConvertOptions::new(SyncMode::Update));
//! let stats = converter.run(&arena)?;
//! ```

mod converter;
mod detector;
mod resources;
mod seen;
mod status;
mod transcode;
mod types;

pub use converter::{CancelToken, ConvertOptions, Converter};
pub use detector::{
    ChangeDetector, Deletions, ElementQuery, FileCheck, ModelSearch, SearchResults, ViewSearch,
};
pub use resources::{changed_resources, record_resources};
pub use seen::{SeenKey, SeenSets, SkipKey};
pub use status::{get_status, print_status, StatusReport};
pub use transcode::{DefaultTranscoder, Transcoded, Transcoder};
pub use types::{ChangeType, ConvertStats, SyncMode};

//! Diagnostics sinks for computed element hashes.
//!
//! A sink is owned by the job's [`HashNormalizer`](super::HashNormalizer),
//! so dumps from concurrent jobs never interleave.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::warn;

use super::ContentHash;
use crate::model::SourceElement;

/// Receives every top-level element hash as it is computed.
pub trait HashSink {
    fn on_element_hashed(&self, element: &SourceElement, hash: &ContentHash);
}

/// Discards everything.
pub struct NullSink;

impl HashSink for NullSink {
    fn on_element_hashed(&self, _element: &SourceElement, _hash: &ContentHash) {}
}

/// Appends one JSON line per hashed element to a file.
pub struct FileHashDump {
    writer: Mutex<BufWriter<File>>,
}

impl FileHashDump {
    /// Open (or create) the dump file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl HashSink for FileHashDump {
    fn on_element_hashed(&self, element: &SourceElement, hash: &ContentHash) {
        let line = serde_json::json!({
            "id": element.id.0,
            "element_type": element.header.element_type,
            "hash": hash.to_hex(),
        });
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        if let Err(e) = writeln!(writer, "{line}") {
            warn!(error = %e, "Failed to write hash dump");
        }
    }
}

impl Drop for FileHashDump {
    fn drop(&mut self) {
        if let Ok(writer) = self.writer.get_mut() {
            let _ = writer.flush();
        }
    }
}

/// Collects hashes in memory.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingSink {
    seen: std::sync::Arc<Mutex<Vec<(crate::model::StableId, ContentHash)>>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn recorded(&self) -> Vec<(crate::model::StableId, ContentHash)> {
        self.seen.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl HashSink for RecordingSink {
    fn on_element_hashed(&self, element: &SourceElement, hash: &ContentHash) {
        self.seen.lock().unwrap().push((element.id, *hash));
    }
}

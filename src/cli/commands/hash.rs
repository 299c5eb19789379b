//! Hash command: print normalized element hashes for diagnostics.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::hash::{ContentHash, HashNormalizer};
use crate::model::snapshot::load_snapshot;
use crate::model::StableId;

#[derive(Serialize)]
struct HashLine<'a> {
    model: &'a str,
    id: StableId,
    element_type: u16,
    hash: ContentHash,
}

/// Execute the hash command.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be loaded, or `InvalidArgument`
/// if `element` names an id the file does not contain.
pub fn execute(source: &Path, element: Option<u64>, json: bool) -> Result<()> {
    let file = load_snapshot(source)?;
    let normalizer = HashNormalizer::new();

    let lines: Vec<HashLine<'_>> = file
        .models
        .iter()
        .flat_map(|model| model.elements.iter().map(move |e| (model, e)))
        .filter(|(_, e)| element.is_none_or(|id| e.id == StableId(id)))
        .map(|(model, e)| HashLine {
            model: &model.name,
            id: e.id,
            element_type: e.header.element_type,
            hash: normalizer.compute_hash(e),
        })
        .collect();

    if let Some(id) = element {
        if lines.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "element {id} not found in {}",
                source.display()
            )));
        }
    }

    if json {
        println!("{}", serde_json::to_string(&lines)?);
        return Ok(());
    }

    for line in &lines {
        println!(
            "{}  {:>8}  type {:<3} {}",
            line.hash.to_hex().cyan(),
            line.id.0,
            line.element_type,
            line.model.dimmed()
        );
    }
    Ok(())
}

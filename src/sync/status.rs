//! Store status display.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::storage::{RunRecord, StoreCounts, SyncStore};

/// What the store holds and how the last run went.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub db_path: PathBuf,
    pub counts: StoreCounts,
    pub last_run: Option<RunRecord>,
}

/// # Errors
///
/// Returns an error if the store queries fail.
pub fn get_status(store: &SyncStore, db_path: &Path) -> Result<StatusReport> {
    Ok(StatusReport {
        db_path: db_path.to_path_buf(),
        counts: store.counts()?,
        last_run: store.last_run()?,
    })
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// Print status to stdout in a human-readable format.
pub fn print_status(report: &StatusReport) {
    println!("{}", "SyncInfo Status".bold().underline());
    println!();
    println!("Store: {}", report.db_path.display());
    println!();

    let counts = &report.counts;
    println!("{}", "Tracked Records:".blue().bold());
    println!("  Files:     {}", counts.files);
    println!("  Models:    {}", counts.models);
    println!("  Elements:  {}", counts.elements);
    println!("  Views:     {}", counts.views);
    if counts.discards > 0 {
        println!("  Discarded: {}", counts.discards);
    }
    if counts.resources > 0 {
        println!("  Resources: {}", counts.resources);
    }
    println!();

    println!("{}", "Target Repository:".blue().bold());
    println!("  Models:    {}", counts.target_models);
    println!("  Elements:  {}", counts.target_elements);
    println!("  Views:     {}", counts.target_views);
    println!();

    let Some(run) = &report.last_run else {
        println!("{}", "No runs recorded.".dimmed());
        return;
    };

    let status = match run.status.as_str() {
        "completed" => run.status.green(),
        "cancelled" => run.status.yellow(),
        _ => run.status.red(),
    };
    println!("{}", "Last Run:".blue().bold());
    println!("  ID:        {}", run.id.dimmed());
    println!("  Mode:      {}", run.mode);
    println!("  Status:    {status}");
    println!("  Started:   {}", format_millis(run.started_at));
    if let Some(finished) = run.finished_at {
        println!("  Finished:  {}", format_millis(finished));
    }
    println!(
        "  Changes:   {} inserted, {} updated, {} deleted, {} unchanged, {} skipped",
        run.counts.inserted.to_string().green(),
        run.counts.updated.to_string().yellow(),
        run.counts.deleted.to_string().red(),
        run.counts.unchanged,
        run.counts.skipped,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RunCounts;

    #[test]
    fn test_status_reports_last_run() {
        let mut store = SyncStore::open_memory().unwrap();
        store.begin_run("run-1", "create").unwrap();
        store
            .finish_run("run-1", "completed", &RunCounts::default())
            .unwrap();

        let report = get_status(&store, Path::new("site.syncinfo.db")).unwrap();
        assert_eq!(report.counts.files, 0);
        assert_eq!(report.last_run.unwrap().status, "completed");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00:00 UTC");
    }
}

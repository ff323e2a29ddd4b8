//! History query, export, and retention cleanup.

use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{info, instrument};

use crate::error::Result;
use crate::holding::HoldingArea;
use crate::model::Operation;
use crate::store::{HistoryFilter, Store};

const LAST_CLEANUP_KEY: &str = "last_cleanup_at";

/// Export format for `oplog export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Flattened operation record as written by `export`. Paths and timestamps
/// are strings so the schema is self-contained.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExportRecord {
    pub id: i64,
    pub kind: String,
    /// ISO 8601 UTC timestamp.
    pub timestamp: String,
    pub source_path: String,
    pub destination_path: Option<String>,
    pub content_hash: Option<String>,
    pub size_bytes: Option<u64>,
    pub transaction_id: Option<String>,
    pub status: String,
    pub error: Option<String>,
    /// Id of the operation this record reversed, for audit rows.
    pub reverts: Option<i64>,
    /// Id of the operation this record re-applied, for audit rows.
    pub replays: Option<i64>,
}

impl From<&Operation> for ExportRecord {
    fn from(op: &Operation) -> Self {
        Self {
            id: op.id,
            kind: op.kind.to_string(),
            timestamp: op.timestamp.to_rfc3339(),
            source_path: op.source_path.to_string_lossy().into_owned(),
            destination_path: op
                .destination_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            content_hash: op.content_hash.clone(),
            size_bytes: op.metadata.size,
            transaction_id: op.transaction_id.map(|id| id.to_string()),
            status: op.status.to_string(),
            error: op.error.clone(),
            reverts: op.reverts,
            replays: op.replays,
        }
    }
}

/// Generate the JSON Schema for exported records.
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(ExportRecord);
    serde_json::to_string_pretty(&schema).expect("failed to serialize schema")
}

/// Filtered history listing, newest first.
pub fn query(store: &Store, filter: &HistoryFilter) -> Result<Vec<Operation>> {
    store.list(filter)
}

/// Export matching history to `out`. Returns the number of records written.
#[instrument(skip(store, filter))]
pub fn export(
    store: &Store,
    filter: &HistoryFilter,
    format: ExportFormat,
    out: &Path,
) -> Result<usize> {
    let operations = store.list(filter)?;
    let records: Vec<ExportRecord> = operations.iter().map(ExportRecord::from).collect();

    let mut file = std::fs::File::create(out)?;
    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut file, &records)?;
            writeln!(&mut file)?;
        }
        ExportFormat::Csv => {
            writeln!(
                &mut file,
                "id,kind,timestamp,source_path,destination_path,content_hash,size_bytes,transaction_id,status,error,reverts,replays"
            )?;
            for r in &records {
                writeln!(
                    &mut file,
                    "{},{},{},{},{},{},{},{},{},{},{},{}",
                    r.id,
                    r.kind,
                    r.timestamp,
                    csv_field(&r.source_path),
                    csv_field(r.destination_path.as_deref().unwrap_or("")),
                    r.content_hash.as_deref().unwrap_or(""),
                    r.size_bytes.map(|s| s.to_string()).unwrap_or_default(),
                    r.transaction_id.as_deref().unwrap_or(""),
                    r.status,
                    csv_field(r.error.as_deref().unwrap_or("")),
                    r.reverts.map(|i| i.to_string()).unwrap_or_default(),
                    r.replays.map(|i| i.to_string()).unwrap_or_default(),
                )?;
            }
        }
    }
    file.sync_all()?;
    info!(count = records.len(), path = %out.display(), "exported history");
    Ok(records.len())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Retention policy bounds. Unset fields are not enforced.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupPolicy {
    /// Keep at most this many operation records.
    pub max_count: Option<usize>,
    /// Drop records older than this many days.
    pub max_age_days: Option<u32>,
    /// Shrink the store below this many bytes.
    pub max_size_bytes: Option<u64>,
}

/// What a cleanup pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed_operations: usize,
    pub removed_transactions: usize,
    pub purged_holding_entries: usize,
    pub reclaimed_holding_bytes: u64,
}

/// Apply retention policies and purge expired holding-area entries.
/// Records belonging to in-progress transactions are never removed.
#[instrument(skip(store, holding))]
pub fn cleanup(store: &Store, holding: &HoldingArea, policy: &CleanupPolicy) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();

    if let Some(days) = policy.max_age_days {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        report.removed_operations += store.delete_older_than(cutoff)?;
    }
    if let Some(max_count) = policy.max_count {
        report.removed_operations += store.delete_overflow(max_count)?;
    }
    if let Some(max_size) = policy.max_size_bytes {
        // Halve until under the bound; vacuum so file size reflects reality.
        while store.size_bytes()? > max_size {
            let count = store.count_operations()?;
            if count == 0 {
                break;
            }
            let removed = store.delete_overflow(count / 2)?;
            store.vacuum()?;
            if removed == 0 {
                break;
            }
            report.removed_operations += removed;
        }
    }

    report.removed_transactions = store.delete_empty_transactions()?;
    if report.removed_operations > 0 {
        store.vacuum()?;
    }

    let (purged, bytes) = holding.purge_expired()?;
    report.purged_holding_entries = purged;
    report.reclaimed_holding_bytes = bytes;

    store.set_meta(LAST_CLEANUP_KEY, &Utc::now().to_rfc3339())?;
    info!(
        removed = report.removed_operations,
        purged = report.purged_holding_entries,
        "cleanup finished"
    );
    Ok(report)
}

/// Whether the scheduled cleanup interval has elapsed since the last pass.
pub fn autoclean_due(store: &Store, interval_hours: u32) -> Result<bool> {
    match store.get_meta(LAST_CLEANUP_KEY)? {
        None => Ok(true),
        Some(ts) => match chrono::DateTime::parse_from_rfc3339(&ts) {
            Ok(last) => {
                Ok(Utc::now() - last.with_timezone(&Utc) > Duration::hours(i64::from(interval_hours)))
            }
            // Unparseable marker: run cleanup and rewrite it.
            Err(_) => Ok(true),
        },
    }
}

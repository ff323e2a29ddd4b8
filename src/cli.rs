use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::history::ExportFormat;
use crate::model::OpKind;

/// Operation history and undo/redo engine for file-organization tools.
#[derive(Parser)]
#[command(name = "oplog", version, about, long_about = None)]
pub struct Cli {
    /// Base directory for the database and holding area (default: ~/.oplog).
    #[arg(long, global = true)]
    pub base: Option<PathBuf>,

    /// Path to a JSON config file; overrides --base.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output structured NDJSON events to stdout.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print JSON Schema for exported history records.
    Schema,
    /// Record a file action that has already been performed.
    Record(RecordArgs),
    /// Soft-delete a file into the holding area and record it.
    Delete(DeleteArgs),
    /// Reverse the most recent operation, a specific one, or a transaction.
    Undo(UndoArgs),
    /// Re-apply the most recently undone operation.
    Redo(RedoArgs),
    /// List recorded operations.
    History(HistoryArgs),
    /// Export history to a structured file.
    Export(ExportArgs),
    /// Apply retention policies to the log and the holding area.
    Cleanup(CleanupArgs),
}

#[derive(Args)]
pub struct RecordArgs {
    /// Kind of the performed action.
    #[arg(long, value_enum)]
    pub kind: OpKind,

    /// Original path of the file.
    pub source: PathBuf,

    /// Where the file now lives (required except for delete).
    pub destination: Option<PathBuf>,

    /// Free-form metadata as key=value pairs.
    #[arg(long = "meta", value_parser = parse_key_val)]
    pub meta: Vec<(String, String)>,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// File to soft-delete.
    pub path: PathBuf,

    /// Free-form metadata as key=value pairs.
    #[arg(long = "meta", value_parser = parse_key_val)]
    pub meta: Vec<(String, String)>,
}

#[derive(Args)]
pub struct UndoArgs {
    /// Undo a specific operation id instead of the most recent.
    #[arg(long, conflicts_with = "transaction")]
    pub operation: Option<i64>,

    /// Roll back a whole transaction.
    #[arg(long)]
    pub transaction: Option<Uuid>,
}

#[derive(Args)]
pub struct RedoArgs {
    /// Redo a specific operation id instead of the most recent.
    #[arg(long)]
    pub operation: Option<i64>,
}

#[derive(Args, Default)]
pub struct HistoryArgs {
    /// Filter by operation kind.
    #[arg(long, value_enum)]
    pub kind: Option<OpKind>,

    /// Only operations newer than this (e.g. "2h", "7d").
    #[arg(long)]
    pub since: Option<humantime::Duration>,

    /// Substring match against source or destination path.
    #[arg(long)]
    pub search: Option<String>,

    /// Filter by transaction id.
    #[arg(long)]
    pub transaction: Option<Uuid>,

    /// Maximum number of records (default 50 for history, unlimited for export).
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Output format.
    #[arg(long, value_enum, default_value = "json")]
    pub format: ExportFormat,

    /// Output file path.
    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub filter: HistoryArgs,
}

#[derive(Args)]
pub struct CleanupArgs {
    /// Keep at most this many operation records.
    #[arg(long)]
    pub max_count: Option<usize>,

    /// Drop records older than this (e.g. "90d").
    #[arg(long)]
    pub max_age: Option<humantime::Duration>,

    /// Shrink the store below this size (e.g. "50MB").
    #[arg(long)]
    pub max_size: Option<bytesize::ByteSize>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

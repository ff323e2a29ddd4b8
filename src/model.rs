use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Store-assigned monotonic operation id (SQLite rowid).
pub type OperationId = i64;

/// Metadata key under which a Delete operation records where the file
/// was stashed in the holding area.
pub const HOLDING_PATH_KEY: &str = "holding_path";

/// Kind of physical file mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// File moved to a different directory.
    Move,
    /// File renamed within its directory.
    Rename,
    /// File soft-deleted into the holding area.
    Delete,
    /// File copied, source untouched.
    Copy,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Move => write!(f, "move"),
            Self::Rename => write!(f, "rename"),
            Self::Delete => write!(f, "delete"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

impl std::str::FromStr for OpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move" => Ok(Self::Move),
            "rename" => Ok(Self::Rename),
            "delete" => Ok(Self::Delete),
            "copy" => Ok(Self::Copy),
            _ => Err(format!("unknown operation kind: {s}")),
        }
    }
}

/// Operation lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Completed,
    Failed,
    RolledBack,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "rolled_back" => Ok(Self::RolledBack),
            _ => Err(format!("unknown operation status: {s}")),
        }
    }
}

/// Snapshot of file attributes taken when the operation was recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes.
    pub size: Option<u64>,
    /// Unix permission bits (None on platforms without them).
    pub mode: Option<u32>,
    /// Modification time of the file when recorded.
    pub modified_at: Option<DateTime<Utc>>,
    /// Free-form key/value pairs supplied by the caller.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl FileMetadata {
    pub fn holding_path(&self) -> Option<PathBuf> {
        self.extra.get(HOLDING_PATH_KEY).map(PathBuf::from)
    }
}

/// One recorded file mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Store-assigned monotonic id.
    pub id: OperationId,
    pub kind: OpKind,
    /// UTC time the operation was recorded.
    pub timestamp: DateTime<Utc>,
    pub source_path: PathBuf,
    /// Absent for Delete.
    pub destination_path: Option<PathBuf>,
    /// SHA-256 of the file content at record time, hex-encoded.
    pub content_hash: Option<String>,
    pub metadata: FileMetadata,
    /// Transaction membership; standalone operations have none.
    pub transaction_id: Option<Uuid>,
    pub status: OperationStatus,
    pub error: Option<String>,
    /// Set on reversal audit records: the id of the operation this record reversed.
    pub reverts: Option<OperationId>,
    /// Set on redo audit records: the id of the operation this record re-applied.
    pub replays: Option<OperationId>,
}

impl Operation {
    /// An organic record is one produced by normal activity, as opposed to
    /// the audit records written by undo/redo. Only organic records
    /// participate in the undo/redo stacks.
    pub fn is_organic(&self) -> bool {
        self.reverts.is_none() && self.replays.is_none()
    }

    /// The path the file currently lives at, assuming no out-of-band changes:
    /// destination for Move/Rename/Copy, the holding area for Delete.
    pub fn current_path(&self) -> Option<PathBuf> {
        match self.kind {
            OpKind::Delete => self.metadata.holding_path(),
            _ => self.destination_path.clone(),
        }
    }
}

/// A not-yet-persisted operation, as handed to `Store::append`.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub kind: OpKind,
    pub source_path: PathBuf,
    pub destination_path: Option<PathBuf>,
    pub content_hash: Option<String>,
    pub metadata: FileMetadata,
    pub transaction_id: Option<Uuid>,
    pub status: OperationStatus,
    pub error: Option<String>,
    pub reverts: Option<OperationId>,
    pub replays: Option<OperationId>,
}

impl NewOperation {
    /// A completed organic record.
    pub fn completed(
        kind: OpKind,
        source_path: PathBuf,
        destination_path: Option<PathBuf>,
        content_hash: Option<String>,
        metadata: FileMetadata,
    ) -> Self {
        Self {
            kind,
            source_path,
            destination_path,
            content_hash,
            metadata,
            transaction_id: None,
            status: OperationStatus::Completed,
            error: None,
            reverts: None,
            replays: None,
        }
    }
}

/// Transaction lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    InProgress,
    Committed,
    RolledBack,
    PartiallyRolledBack,
    /// Assigned by the startup recovery scan to transactions a previous
    /// process left open. Members of a failed transaction are not undoable.
    Failed,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::PartiallyRolledBack => write!(f, "partially_rolled_back"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "committed" => Ok(Self::Committed),
            "rolled_back" => Ok(Self::RolledBack),
            "partially_rolled_back" => Ok(Self::PartiallyRolledBack),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown transaction status: {s}")),
        }
    }
}

/// An atomic group of operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub operation_count: i64,
    pub status: TxStatus,
}

impl Transaction {
    pub fn begin() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            operation_count: 0,
            status: TxStatus::InProgress,
        }
    }
}

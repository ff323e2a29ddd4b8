use crate::model::OperationId;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Why the validator refused a reversal. Carried inside
/// [`EngineError::Conflict`] and surfaced verbatim to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    #[error("file is missing: {path}")]
    MissingFile { path: PathBuf },
    #[error("content of {path} changed since the operation was recorded (expected {expected}, found {actual})")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("target path is occupied by another file: {path}")]
    PathOccupied { path: PathBuf },
    #[error("a later operation (id {operation_id}) already touched {path}")]
    LaterOperation {
        path: PathBuf,
        operation_id: OperationId,
    },
    #[error("holding-area entry for {path} has passed its retention window")]
    RetentionExpired { path: PathBuf },
    #[error("operation has no recorded content hash to verify against")]
    MissingHash,
}

/// Engine error taxonomy.
///
/// `Store`, `Io` and `Serde` are fatal for the call that hit them; `Conflict`
/// is recoverable and means no mutation was attempted.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("validation conflict: {0}")]
    Conflict(ConflictReason),

    #[error("rollback of operation {id} failed: {message}")]
    Rollback { id: OperationId, message: String },

    #[error("transaction {id} was left in progress by a previous run")]
    CorruptTransaction { id: Uuid },

    #[error("a transaction ({id}) is already open; nested transactions are not supported")]
    TransactionAlreadyOpen { id: Uuid },

    #[error("transaction not found: {id}")]
    TransactionNotFound { id: Uuid },

    #[error("transaction {id} is {status}, expected {expected}")]
    TransactionState {
        id: Uuid,
        status: String,
        expected: String,
    },

    #[error("operation not found: {id}")]
    OperationNotFound { id: OperationId },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("operation {id} is not undoable: {reason}")]
    NotUndoable { id: OperationId, reason: String },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// True for errors the caller can recover from without operator action.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::NothingToUndo | Self::NothingToRedo
        )
    }
}

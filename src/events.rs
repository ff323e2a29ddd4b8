use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::model::OperationId;

/// Structured event emitted during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    OperationRecorded {
        id: OperationId,
        kind: String,
        src: PathBuf,
        dst: Option<PathBuf>,
    },
    DeleteStashed {
        id: OperationId,
        src: PathBuf,
        holding_path: PathBuf,
    },
    OperationReversed {
        id: OperationId,
        reversal_id: OperationId,
    },
    OperationReplayed {
        id: OperationId,
        replay_id: OperationId,
    },
    ConflictDetected {
        reason: String,
    },
    TransactionRecovered {
        transaction_id: Uuid,
    },
    TransactionRolledBack {
        transaction_id: Uuid,
        status: String,
        reversed: Vec<OperationId>,
        failed: Vec<(OperationId, String)>,
    },
    HistoryExported {
        path: PathBuf,
        count: usize,
    },
    CleanupCompleted {
        removed_operations: usize,
        purged_holding_entries: usize,
        reclaimed_holding_bytes: u64,
    },
}

//! Physical reversal of validated operations, one function per kind of
//! mutation, plus the forward replay used by redo.
//!
//! Every successful reversal writes a new audit record into the store (linked
//! through `reverts`) and flips the original to `RolledBack`; a failed
//! filesystem call marks the original `Failed` instead. Nothing here retries:
//! undo is user-triggered and potentially destructive, so a failure is
//! surfaced once and left alone.

use tracing::{info, instrument, warn};

use crate::error::{EngineError, Result};
use crate::fsops;
use crate::holding::HoldingArea;
use crate::model::{
    HOLDING_PATH_KEY, NewOperation, OpKind, Operation, OperationId, OperationStatus,
};
use crate::store::Store;

/// Reverse a single validated operation. Returns the id of the reversal
/// audit record.
#[instrument(skip(store, holding, op), fields(id = op.id, kind = %op.kind))]
pub fn reverse(store: &Store, holding: &HoldingArea, op: &Operation) -> Result<OperationId> {
    let outcome = match op.kind {
        OpKind::Move | OpKind::Rename => reverse_move(op),
        OpKind::Delete => reverse_delete(holding, op),
        OpKind::Copy => reverse_copy(op),
    };

    match outcome {
        Ok(reversal) => {
            let reversal_id = store.append(&reversal)?;
            store.update_status(op.id, OperationStatus::RolledBack, None)?;
            info!(reversal_id, "operation reversed");
            Ok(reversal_id)
        }
        Err(err) => {
            let message = err.to_string();
            warn!(error = %message, "reversal failed");
            store.update_status(op.id, OperationStatus::Failed, Some(&message))?;
            Err(EngineError::Rollback {
                id: op.id,
                message,
            })
        }
    }
}

/// Move/Rename reversal: the inverse move, destination back to source.
fn reverse_move(op: &Operation) -> Result<NewOperation> {
    let dst = op
        .destination_path
        .as_ref()
        .ok_or_else(|| EngineError::Rollback {
            id: op.id,
            message: "record has no destination path".to_string(),
        })?;
    fsops::mv(dst, &op.source_path)?;
    fsops::restore_mtime(&op.source_path, op.metadata.modified_at)?;

    let metadata = fsops::capture_metadata(&op.source_path)?;
    let mut reversal = NewOperation::completed(
        op.kind,
        dst.clone(),
        Some(op.source_path.clone()),
        op.content_hash.clone(),
        metadata,
    );
    reversal.reverts = Some(op.id);
    Ok(reversal)
}

/// Delete reversal: restore the stashed file from the holding area.
fn reverse_delete(holding: &HoldingArea, op: &Operation) -> Result<NewOperation> {
    let stash = op
        .metadata
        .holding_path()
        .ok_or_else(|| EngineError::Rollback {
            id: op.id,
            message: "delete record has no holding-area path".to_string(),
        })?;
    holding.restore(&stash, &op.source_path)?;
    fsops::restore_mtime(&op.source_path, op.metadata.modified_at)?;

    let metadata = fsops::capture_metadata(&op.source_path)?;
    let mut reversal = NewOperation::completed(
        OpKind::Move,
        stash,
        Some(op.source_path.clone()),
        op.content_hash.clone(),
        metadata,
    );
    reversal.reverts = Some(op.id);
    Ok(reversal)
}

/// Copy reversal: remove the copy, leaving the source untouched. The copy is
/// redundant with the source content, so it is removed directly rather than
/// stashed.
fn reverse_copy(op: &Operation) -> Result<NewOperation> {
    let dst = op
        .destination_path
        .as_ref()
        .ok_or_else(|| EngineError::Rollback {
            id: op.id,
            message: "record has no destination path".to_string(),
        })?;
    fsops::remove_any(dst)?;

    let mut reversal = NewOperation::completed(
        OpKind::Delete,
        dst.clone(),
        None,
        op.content_hash.clone(),
        op.metadata.clone(),
    );
    reversal.reverts = Some(op.id);
    Ok(reversal)
}

/// Re-apply a rolled-back operation (the redo path). Returns the id of the
/// replay audit record; the original flips back to `Completed` so it is
/// undoable again.
#[instrument(skip(store, holding, op), fields(id = op.id, kind = %op.kind))]
pub fn replay(store: &Store, holding: &HoldingArea, op: &Operation) -> Result<OperationId> {
    let replay_id = match op.kind {
        OpKind::Move | OpKind::Rename | OpKind::Copy => {
            let dst = op
                .destination_path
                .as_ref()
                .ok_or_else(|| EngineError::Rollback {
                    id: op.id,
                    message: "record has no destination path".to_string(),
                })?;
            if op.kind == OpKind::Copy {
                fsops::cp(&op.source_path, dst)?;
            } else {
                fsops::mv(&op.source_path, dst)?;
            }
            let metadata = fsops::capture_metadata(dst)?;
            let mut replay = NewOperation::completed(
                op.kind,
                op.source_path.clone(),
                Some(dst.clone()),
                op.content_hash.clone(),
                metadata,
            );
            replay.replays = Some(op.id);
            store.append(&replay)?
        }
        OpKind::Delete => {
            // Stash anew; the original record learns the fresh location so a
            // later undo restores from the right place.
            let stash = holding.stash(&op.source_path)?;
            store.update_extra(op.id, HOLDING_PATH_KEY, &stash.to_string_lossy())?;

            let content_hash = fsops::hash_file(&stash)?;
            let mut metadata = fsops::capture_metadata(&stash)?;
            metadata.extra.insert(
                HOLDING_PATH_KEY.to_string(),
                stash.to_string_lossy().into_owned(),
            );
            let mut replay = NewOperation::completed(
                OpKind::Delete,
                op.source_path.clone(),
                None,
                Some(content_hash),
                metadata,
            );
            replay.replays = Some(op.id);
            store.append(&replay)?
        }
    };

    store.update_status(op.id, OperationStatus::Completed, None)?;
    info!(replay_id, "operation re-applied");
    Ok(replay_id)
}

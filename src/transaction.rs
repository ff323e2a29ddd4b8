//! Transaction manager: groups related operations into one atomic unit with
//! commit/rollback semantics.
//!
//! One open transaction per engine; `begin` while another is open is
//! rejected. Rollback walks members in reverse chronological order, validates
//! each through the safety gate, and never silently skips a failure: a
//! partial outcome names the exact members that could not be reversed.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::holding::HoldingArea;
use crate::model::{OperationId, OperationStatus, Transaction, TxStatus};
use crate::rollback;
use crate::store::Store;
use crate::validate::{self, Validation};

/// Outcome of a whole-transaction rollback.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub transaction_id: Uuid,
    pub status: TxStatus,
    /// Member operations reversed, in the order they were processed.
    pub reversed: Vec<OperationId>,
    /// Members that could not be reversed, with the reason.
    pub failed: Vec<(OperationId, String)>,
}

impl RollbackResult {
    pub fn fully_rolled_back(&self) -> bool {
        self.status == TxStatus::RolledBack
    }
}

/// Open a new transaction envelope. `current` is the engine's open-transaction
/// slot; nesting is rejected.
pub fn begin(store: &Store, current: &mut Option<Uuid>) -> Result<Uuid> {
    if let Some(open) = *current {
        return Err(EngineError::TransactionAlreadyOpen { id: open });
    }
    let tx = Transaction::begin();
    store.append_transaction(&tx)?;
    *current = Some(tx.id);
    info!(transaction = %tx.id, "transaction opened");
    Ok(tx.id)
}

/// Mark a transaction committed. Every member must be `Completed`; a member
/// in any other state aborts the commit and leaves the transaction open.
pub fn commit(store: &Store, current: &mut Option<Uuid>, id: Uuid) -> Result<()> {
    let tx = store
        .get_transaction(id)?
        .ok_or(EngineError::TransactionNotFound { id })?;
    if tx.status != TxStatus::InProgress {
        return Err(EngineError::TransactionState {
            id,
            status: tx.status.to_string(),
            expected: TxStatus::InProgress.to_string(),
        });
    }

    for member in store.operations_in_transaction(id)? {
        if member.status != OperationStatus::Completed {
            return Err(EngineError::TransactionState {
                id,
                status: format!("member operation {} is {}", member.id, member.status),
                expected: "all members completed".to_string(),
            });
        }
    }

    store.update_transaction_status(id, TxStatus::Committed, Some(Utc::now()))?;
    if *current == Some(id) {
        *current = None;
    }
    info!(transaction = %id, "transaction committed");
    Ok(())
}

/// Roll back every member of a committed transaction in reverse chronological
/// order. Members that fail validation or reversal are collected, not
/// skipped over silently.
#[instrument(skip(store, holding))]
pub fn rollback(store: &Store, holding: &HoldingArea, id: Uuid) -> Result<RollbackResult> {
    let tx = store
        .get_transaction(id)?
        .ok_or(EngineError::TransactionNotFound { id })?;
    if !matches!(
        tx.status,
        TxStatus::Committed | TxStatus::PartiallyRolledBack
    ) {
        return Err(EngineError::TransactionState {
            id,
            status: tx.status.to_string(),
            expected: TxStatus::Committed.to_string(),
        });
    }

    let mut reversed = Vec::new();
    let mut failed = Vec::new();

    let mut members = store.operations_in_transaction(id)?;
    members.reverse();
    for member in &members {
        if member.status == OperationStatus::RolledBack {
            // Already reversed in an earlier partial attempt.
            continue;
        }
        // Failed members are re-attempted: until one is actually reversed
        // the transaction must stay partially rolled back.
        match validate::check_undo(store, holding, member)? {
            Validation::Ok => match rollback::reverse(store, holding, member) {
                Ok(_) => reversed.push(member.id),
                Err(err) => failed.push((member.id, err.to_string())),
            },
            Validation::Conflict(reason) => failed.push((member.id, reason.to_string())),
        }
    }

    let status = if failed.is_empty() {
        TxStatus::RolledBack
    } else {
        warn!(transaction = %id, failed = failed.len(), "transaction only partially rolled back");
        TxStatus::PartiallyRolledBack
    };
    store.update_transaction_status(id, status, Some(Utc::now()))?;

    Ok(RollbackResult {
        transaction_id: id,
        status,
        reversed,
        failed,
    })
}

/// Startup recovery: resolve transactions a previous process left open.
/// Each becomes `Failed`, which excludes its members from the undo stack.
pub fn recover_incomplete(store: &Store) -> Result<Vec<Uuid>> {
    let mut resolved = Vec::new();
    for tx in store.in_progress_transactions()? {
        warn!(transaction = %tx.id, started_at = %tx.started_at,
              "resolving transaction left in progress by a previous run");
        store.update_transaction_status(tx.id, TxStatus::Failed, Some(Utc::now()))?;
        resolved.push(tx.id);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OpKind;
    use crate::tracker;
    use tempfile::tempdir;

    #[test]
    fn begin_rejects_nesting() {
        let store = Store::open_in_memory().unwrap();
        let mut current = None;
        let first = begin(&store, &mut current).unwrap();
        let err = begin(&store, &mut current).unwrap_err();
        assert!(matches!(err, EngineError::TransactionAlreadyOpen { id } if id == first));
    }

    #[test]
    fn commit_requires_all_members_completed() {
        let dir = tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let mut current = None;
        let id = begin(&store, &mut current).unwrap();

        let dst = dir.path().join("b.txt");
        std::fs::write(&dst, "x").unwrap();
        let op = tracker::record(
            &store,
            Some(id),
            OpKind::Move,
            dir.path().join("a.txt"),
            dst,
            Default::default(),
        )
        .unwrap();
        store
            .update_status(op, OperationStatus::Failed, Some("disk full"))
            .unwrap();

        let err = commit(&store, &mut current, id).unwrap_err();
        assert!(matches!(err, EngineError::TransactionState { .. }));
        // Still open; the slot is not cleared.
        assert_eq!(current, Some(id));
    }

    #[test]
    fn commit_finalizes_and_clears_slot() {
        let store = Store::open_in_memory().unwrap();
        let mut current = None;
        let id = begin(&store, &mut current).unwrap();
        commit(&store, &mut current, id).unwrap();
        assert!(current.is_none());

        let tx = store.get_transaction(id).unwrap().unwrap();
        assert_eq!(tx.status, TxStatus::Committed);
        assert!(tx.completed_at.is_some());
    }

    #[test]
    fn rollback_rejects_in_progress_transaction() {
        let store = Store::open_in_memory().unwrap();
        let holding_dir = tempdir().unwrap();
        let holding = HoldingArea::open(holding_dir.path().to_path_buf(), 30).unwrap();
        let mut current = None;
        let id = begin(&store, &mut current).unwrap();

        let err = rollback(&store, &holding, id).unwrap_err();
        assert!(matches!(err, EngineError::TransactionState { .. }));
    }

    #[test]
    fn retry_stays_partial_until_member_is_actually_reversed() {
        let dir = tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let holding = HoldingArea::open(dir.path().join("hold"), 30).unwrap();
        let mut current = None;
        let id = begin(&store, &mut current).unwrap();

        let src = dir.path().join("sub/a.txt");
        let dst = dir.path().join("sorted/a.txt");
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&dst, "A").unwrap();
        let member = tracker::record(
            &store,
            Some(id),
            OpKind::Move,
            src.clone(),
            dst.clone(),
            Default::default(),
        )
        .unwrap();
        commit(&store, &mut current, id).unwrap();

        // A regular file where the reversal needs a directory, so the
        // reversal fails after validation passes.
        std::fs::write(dir.path().join("sub"), "blocker").unwrap();

        let first = rollback(&store, &holding, id).unwrap();
        assert_eq!(first.status, TxStatus::PartiallyRolledBack);
        assert_eq!(first.failed[0].0, member);

        // Nothing was fixed; a retry must not report a clean rollback.
        let second = rollback(&store, &holding, id).unwrap();
        assert_eq!(second.status, TxStatus::PartiallyRolledBack);
        assert_eq!(second.failed[0].0, member);
        assert!(dst.exists());

        // Once the blocker is gone the retry reverses the member for real.
        std::fs::remove_file(dir.path().join("sub")).unwrap();
        let third = rollback(&store, &holding, id).unwrap();
        assert_eq!(third.status, TxStatus::RolledBack);
        assert_eq!(third.reversed, vec![member]);
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "A");
    }

    #[test]
    fn recover_marks_stale_transactions_failed() {
        let store = Store::open_in_memory().unwrap();
        let mut current = None;
        let id = begin(&store, &mut current).unwrap();

        let resolved = recover_incomplete(&store).unwrap();
        assert_eq!(resolved, vec![id]);
        assert_eq!(
            store.get_transaction(id).unwrap().unwrap().status,
            TxStatus::Failed
        );
    }
}

//! Undo/redo stack manager.
//!
//! The stacks are not separate mutable state: both are queries over the store
//! (`Store::undo_candidates` / `Store::redo_candidates`), so they can never
//! drift out of sync with the log. This module layers ordering, the depth
//! bound, validation, and the actual reversal/replay calls on top of those
//! views.

use serde::Serialize;
use tracing::instrument;

use crate::error::{EngineError, Result};
use crate::holding::HoldingArea;
use crate::model::{Operation, OperationId};
use crate::rollback;
use crate::store::Store;
use crate::validate::{self, Validation};

/// Result of a single-operation undo.
#[derive(Debug, Clone, Serialize)]
pub struct UndoReport {
    pub operation_id: OperationId,
    /// Audit record describing the reversal.
    pub reversal_id: OperationId,
}

/// Result of a single-operation redo.
#[derive(Debug, Clone, Serialize)]
pub struct RedoReport {
    pub operation_id: OperationId,
    /// Audit record describing the replay.
    pub replay_id: OperationId,
}

/// Undo the most recent undoable operation.
#[instrument(skip(store, holding))]
pub fn undo_last(store: &Store, holding: &HoldingArea, depth: usize) -> Result<UndoReport> {
    let top = store
        .undo_candidates(depth.min(1))?
        .into_iter()
        .next()
        .ok_or(EngineError::NothingToUndo)?;
    reverse_checked(store, holding, &top)
}

/// Undo a specific operation, which must be within the bounded undo stack.
#[instrument(skip(store, holding))]
pub fn undo(
    store: &Store,
    holding: &HoldingArea,
    depth: usize,
    id: OperationId,
) -> Result<UndoReport> {
    let op = find_in_stack(store, depth, id)?;
    reverse_checked(store, holding, &op)
}

/// Redo the most recently undone operation, if no new activity has happened
/// since.
#[instrument(skip(store, holding))]
pub fn redo_last(store: &Store, holding: &HoldingArea) -> Result<RedoReport> {
    let top = store
        .redo_candidates()?
        .into_iter()
        .next()
        .ok_or(EngineError::NothingToRedo)?;
    replay_checked(store, holding, &top)
}

/// Redo a specific rolled-back operation from the redo stack.
#[instrument(skip(store, holding))]
pub fn redo(store: &Store, holding: &HoldingArea, id: OperationId) -> Result<RedoReport> {
    let op = store
        .redo_candidates()?
        .into_iter()
        .find(|op| op.id == id)
        .ok_or(EngineError::NothingToRedo)?;
    replay_checked(store, holding, &op)
}

/// Would `undo(id)` succeed, and if not, why not? Runs the same checks as a
/// real undo but mutates nothing.
pub fn can_undo(
    store: &Store,
    holding: &HoldingArea,
    depth: usize,
    id: OperationId,
) -> Result<(bool, Option<String>)> {
    let op = match find_in_stack(store, depth, id) {
        Ok(op) => op,
        Err(EngineError::NotUndoable { reason, .. }) => return Ok((false, Some(reason))),
        Err(EngineError::OperationNotFound { .. }) => {
            return Ok((false, Some("operation not found".to_string())));
        }
        Err(err) => return Err(err),
    };
    match validate::check_undo(store, holding, &op)? {
        Validation::Ok => Ok((true, None)),
        Validation::Conflict(reason) => Ok((false, Some(reason.to_string()))),
    }
}

fn find_in_stack(store: &Store, depth: usize, id: OperationId) -> Result<Operation> {
    let op = store
        .get(id)?
        .ok_or(EngineError::OperationNotFound { id })?;
    let candidates = store.undo_candidates(depth)?;
    if !candidates.iter().any(|c| c.id == id) {
        let reason = if !op.is_organic() {
            "audit records cannot be undone directly".to_string()
        } else {
            format!(
                "operation is not in the undo stack (status {}, stack depth {depth})",
                op.status
            )
        };
        return Err(EngineError::NotUndoable { id, reason });
    }
    Ok(op)
}

fn reverse_checked(store: &Store, holding: &HoldingArea, op: &Operation) -> Result<UndoReport> {
    match validate::check_undo(store, holding, op)? {
        Validation::Ok => {}
        Validation::Conflict(reason) => return Err(EngineError::Conflict(reason)),
    }
    let reversal_id = rollback::reverse(store, holding, op)?;
    Ok(UndoReport {
        operation_id: op.id,
        reversal_id,
    })
}

fn replay_checked(store: &Store, holding: &HoldingArea, op: &Operation) -> Result<RedoReport> {
    match validate::check_redo(store, op)? {
        Validation::Ok => {}
        Validation::Conflict(reason) => return Err(EngineError::Conflict(reason)),
    }
    let replay_id = rollback::replay(store, holding, op)?;
    Ok(RedoReport {
        operation_id: op.id,
        replay_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OpKind;
    use crate::tracker;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        dir: TempDir,
        store: Store,
        holding: HoldingArea,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let holding = HoldingArea::open(dir.path().join("hold"), 30).unwrap();
            Self {
                dir,
                store: Store::open_in_memory().unwrap(),
                holding,
            }
        }

        /// Physically move `name` into sorted/ and record it.
        fn do_move(&self, name: &str, body: &str) -> OperationId {
            let src = self.dir.path().join(name);
            let dst = self.dir.path().join(format!("sorted/{name}"));
            std::fs::write(&src, body).unwrap();
            std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
            crate::fsops::mv(&src, &dst).unwrap();
            tracker::record(&self.store, None, OpKind::Move, src, dst, Default::default())
                .unwrap()
        }
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let fx = Fixture::new();
        let id = fx.do_move("a.txt", "content");
        let src = fx.dir.path().join("a.txt");
        let dst = fx.dir.path().join("sorted/a.txt");

        let report = undo_last(&fx.store, &fx.holding, 1000).unwrap();
        assert_eq!(report.operation_id, id);
        assert!(src.exists());
        assert!(!dst.exists());

        let redo_report = redo_last(&fx.store, &fx.holding).unwrap();
        assert_eq!(redo_report.operation_id, id);
        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "content");
    }

    #[test]
    fn undo_last_with_empty_history_reports_nothing_to_undo() {
        let fx = Fixture::new();
        let err = undo_last(&fx.store, &fx.holding, 1000).unwrap_err();
        assert!(matches!(err, EngineError::NothingToUndo));
    }

    #[test]
    fn new_activity_clears_the_redo_stack() {
        let fx = Fixture::new();
        fx.do_move("a.txt", "first");
        undo_last(&fx.store, &fx.holding, 1000).unwrap();

        // Fresh organic activity after the rollback.
        fx.do_move("b.txt", "second");

        let err = redo_last(&fx.store, &fx.holding).unwrap_err();
        assert!(matches!(err, EngineError::NothingToRedo));
    }

    #[test]
    fn undo_surfaces_conflict_without_mutating() {
        let fx = Fixture::new();
        let id = fx.do_move("a.txt", "content");
        let dst = fx.dir.path().join("sorted/a.txt");
        std::fs::write(&dst, "tampered out of band").unwrap();

        let err = undo(&fx.store, &fx.holding, 1000, id).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        // File untouched, record still Completed.
        assert_eq!(
            std::fs::read_to_string(&dst).unwrap(),
            "tampered out of band"
        );
        assert_eq!(
            fx.store.get(id).unwrap().unwrap().status,
            crate::model::OperationStatus::Completed
        );
    }

    #[test]
    fn operations_beyond_depth_are_unreachable_but_queryable() {
        let fx = Fixture::new();
        let old = fx.do_move("a.txt", "1");
        fx.do_move("b.txt", "2");
        fx.do_move("c.txt", "3");

        let err = undo(&fx.store, &fx.holding, 2, old).unwrap_err();
        assert!(matches!(err, EngineError::NotUndoable { .. }));
        // Still present in history.
        assert!(fx.store.get(old).unwrap().is_some());
    }

    #[test]
    fn can_undo_explains_refusals() {
        let fx = Fixture::new();
        let id = fx.do_move("a.txt", "content");

        let (ok, reason) = can_undo(&fx.store, &fx.holding, 1000, id).unwrap();
        assert!(ok);
        assert!(reason.is_none());

        std::fs::write(fx.dir.path().join("sorted/a.txt"), "tampered").unwrap();
        let (ok, reason) = can_undo(&fx.store, &fx.holding, 1000, id).unwrap();
        assert!(!ok);
        assert!(reason.unwrap().contains("changed since"));
    }
}

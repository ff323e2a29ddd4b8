//! Read-only safety gate consulted before any undo or redo.
//!
//! Checks run in a fixed order: file integrity (does the content still match
//! the recorded hash), write-target availability, then conflicting later
//! operations in the store. The first failed check wins; no mutation is ever
//! attempted here.

use std::path::Path;
use tracing::instrument;

use crate::error::{ConflictReason, Result};
use crate::fsops;
use crate::holding::HoldingArea;
use crate::model::{OpKind, Operation};
use crate::store::Store;

/// Outcome of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Ok,
    Conflict(ConflictReason),
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Can `op` be physically reversed right now?
#[instrument(skip(store, holding, op), fields(id = op.id))]
pub fn check_undo(store: &Store, holding: &HoldingArea, op: &Operation) -> Result<Validation> {
    // 1. Integrity: the file the reversal would move/remove must still be
    //    byte-identical to what the operation recorded.
    let current = match op.current_path() {
        Some(path) => path,
        None => return Ok(Validation::Conflict(ConflictReason::MissingHash)),
    };
    if op.kind == OpKind::Delete && !holding.within_retention(op.timestamp) {
        return Ok(Validation::Conflict(ConflictReason::RetentionExpired {
            path: op.source_path.clone(),
        }));
    }
    if let Some(conflict) = integrity(&current, op.content_hash.as_deref())? {
        return Ok(Validation::Conflict(conflict));
    }

    // 2. Availability: the path the reversal writes to must be free.
    //    Copy reversal only removes the copy, so it has no write target.
    if op.kind != OpKind::Copy && op.source_path.exists() {
        return Ok(Validation::Conflict(ConflictReason::PathOccupied {
            path: op.source_path.clone(),
        }));
    }

    // 3. Conflicts: no later still-completed operation may have touched
    //    either side of this one.
    for path in [op.source_path.as_path(), current.as_path()] {
        if let Some(later) = store.later_operation_touching(path, op.id)? {
            return Ok(Validation::Conflict(ConflictReason::LaterOperation {
                path: path.to_path_buf(),
                operation_id: later,
            }));
        }
    }

    Ok(Validation::Ok)
}

/// Can a rolled-back `op` be re-applied right now?
///
/// After an undo the content sits at `source_path` again; redo re-performs
/// the forward action, so the same three checks run in the forward direction.
#[instrument(skip(store, op), fields(id = op.id))]
pub fn check_redo(store: &Store, op: &Operation) -> Result<Validation> {
    if let Some(conflict) = integrity(&op.source_path, op.content_hash.as_deref())? {
        return Ok(Validation::Conflict(conflict));
    }

    if let Some(dst) = &op.destination_path
        && dst.exists()
    {
        return Ok(Validation::Conflict(ConflictReason::PathOccupied {
            path: dst.clone(),
        }));
    }

    let mut paths = vec![op.source_path.as_path()];
    if let Some(dst) = &op.destination_path {
        paths.push(dst.as_path());
    }
    for path in paths {
        if let Some(later) = store.later_operation_touching(path, op.id)? {
            return Ok(Validation::Conflict(ConflictReason::LaterOperation {
                path: path.to_path_buf(),
                operation_id: later,
            }));
        }
    }

    Ok(Validation::Ok)
}

fn integrity(path: &Path, expected: Option<&str>) -> Result<Option<ConflictReason>> {
    let expected = match expected {
        Some(hash) => hash,
        None => return Ok(Some(ConflictReason::MissingHash)),
    };
    if !path.exists() {
        return Ok(Some(ConflictReason::MissingFile {
            path: path.to_path_buf(),
        }));
    }
    let actual = fsops::hash_file(path)?;
    if actual != expected {
        return Ok(Some(ConflictReason::HashMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileMetadata, NewOperation};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
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

        /// Record a completed move of `name`, with the file physically
        /// present at the destination.
        fn recorded_move(&self, name: &str, body: &str) -> Operation {
            let src = self.dir.path().join(name);
            let dst = self.dir.path().join(format!("sorted/{name}"));
            std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
            std::fs::write(&dst, body).unwrap();
            let op = NewOperation::completed(
                OpKind::Move,
                src,
                Some(dst.clone()),
                Some(fsops::hash_file(&dst).unwrap()),
                FileMetadata::default(),
            );
            let id = self.store.append(&op).unwrap();
            self.store.get(id).unwrap().unwrap()
        }
    }

    #[test]
    fn clean_move_passes() {
        let fx = Fixture::new();
        let op = fx.recorded_move("a.txt", "content");
        assert_eq!(
            check_undo(&fx.store, &fx.holding, &op).unwrap(),
            Validation::Ok
        );
    }

    #[test]
    fn out_of_band_edit_is_rejected_even_with_matching_paths() {
        let fx = Fixture::new();
        let op = fx.recorded_move("a.txt", "content");
        std::fs::write(op.destination_path.as_ref().unwrap(), "tampered").unwrap();

        match check_undo(&fx.store, &fx.holding, &op).unwrap() {
            Validation::Conflict(ConflictReason::HashMismatch { .. }) => {}
            other => panic!("expected hash mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_rejected() {
        let fx = Fixture::new();
        let op = fx.recorded_move("a.txt", "content");
        std::fs::remove_file(op.destination_path.as_ref().unwrap()).unwrap();

        match check_undo(&fx.store, &fx.holding, &op).unwrap() {
            Validation::Conflict(ConflictReason::MissingFile { .. }) => {}
            other => panic!("expected missing file, got {other:?}"),
        }
    }

    #[test]
    fn occupied_write_target_is_rejected() {
        let fx = Fixture::new();
        let op = fx.recorded_move("a.txt", "content");
        std::fs::write(&op.source_path, "squatter").unwrap();

        match check_undo(&fx.store, &fx.holding, &op).unwrap() {
            Validation::Conflict(ConflictReason::PathOccupied { path }) => {
                assert_eq!(path, op.source_path);
            }
            other => panic!("expected path occupied, got {other:?}"),
        }
    }

    #[test]
    fn later_operation_on_same_path_is_rejected() {
        let fx = Fixture::new();
        let op = fx.recorded_move("a.txt", "content");

        // A later completed operation re-used this operation's destination.
        let later = NewOperation::completed(
            OpKind::Move,
            op.destination_path.clone().unwrap(),
            Some(fx.dir.path().join("elsewhere/a.txt")),
            Some("00".repeat(32)),
            FileMetadata::default(),
        );
        let later_id = fx.store.append(&later).unwrap();

        match check_undo(&fx.store, &fx.holding, &op).unwrap() {
            Validation::Conflict(ConflictReason::LaterOperation { operation_id, .. }) => {
                assert_eq!(operation_id, later_id);
            }
            other => panic!("expected later-operation conflict, got {other:?}"),
        }
    }

    #[test]
    fn expired_delete_is_rejected() {
        let fx = Fixture::new();
        let stash = fx.holding.root().join("stash-doc.txt");
        std::fs::write(&stash, "old").unwrap();

        let mut extra = BTreeMap::new();
        extra.insert(
            crate::model::HOLDING_PATH_KEY.to_string(),
            stash.to_string_lossy().into_owned(),
        );
        let op = Operation {
            id: 1,
            kind: OpKind::Delete,
            timestamp: chrono::Utc::now() - chrono::Duration::days(45),
            source_path: PathBuf::from("/docs/doc.txt"),
            destination_path: None,
            content_hash: Some(fsops::hash_file(&stash).unwrap()),
            metadata: FileMetadata {
                extra,
                ..Default::default()
            },
            transaction_id: None,
            status: crate::model::OperationStatus::Completed,
            error: None,
            reverts: None,
            replays: None,
        };

        match check_undo(&fx.store, &fx.holding, &op).unwrap() {
            Validation::Conflict(ConflictReason::RetentionExpired { .. }) => {}
            other => panic!("expected retention expiry, got {other:?}"),
        }
    }

    #[test]
    fn redo_requires_free_destination() {
        let fx = Fixture::new();
        let src = fx.dir.path().join("a.txt");
        let dst = fx.dir.path().join("sorted/a.txt");
        std::fs::write(&src, "content").unwrap();
        std::fs::create_dir_all(dst.parent().unwrap()).unwrap();
        std::fs::write(&dst, "other").unwrap();

        let op = Operation {
            id: 1,
            kind: OpKind::Move,
            timestamp: chrono::Utc::now(),
            source_path: src.clone(),
            destination_path: Some(dst),
            content_hash: Some(fsops::hash_file(&src).unwrap()),
            metadata: FileMetadata::default(),
            transaction_id: None,
            status: crate::model::OperationStatus::RolledBack,
            error: None,
            reverts: None,
            replays: None,
        };

        match check_redo(&fx.store, &op).unwrap() {
            Validation::Conflict(ConflictReason::PathOccupied { .. }) => {}
            other => panic!("expected path occupied, got {other:?}"),
        }
    }
}

//! The write path: turns a performed file action into a persisted record.
//!
//! The caller (the organization pipeline) has already mutated the filesystem;
//! the tracker's job is to hash the result, snapshot its metadata, and get one
//! durable row into the store. A failed append is fatal for the operation;
//! the caller must not treat the action as recorded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::fsops;
use crate::model::{HOLDING_PATH_KEY, NewOperation, OpKind, OperationId};
use crate::store::Store;

/// Record a Move, Rename or Copy that has already been performed.
///
/// The content hash and metadata are taken from the file at `destination`,
/// i.e. from the post-mutation state, so the validator later has an anchor
/// for what the engine itself produced.
#[instrument(skip(store, extra))]
pub fn record(
    store: &Store,
    transaction_id: Option<Uuid>,
    kind: OpKind,
    source: PathBuf,
    destination: PathBuf,
    extra: BTreeMap<String, String>,
) -> Result<OperationId> {
    debug_assert!(kind != OpKind::Delete, "deletes go through record_delete");

    let content_hash = fsops::hash_file(&destination)?;
    let mut metadata = fsops::capture_metadata(&destination)?;
    metadata.extra = extra;

    let mut op = NewOperation::completed(
        kind,
        source,
        Some(destination),
        Some(content_hash),
        metadata,
    );
    op.transaction_id = transaction_id;

    let id = append_tracked(store, &op)?;
    info!(id, %kind, "recorded operation");
    Ok(id)
}

/// Record a Delete whose file has already been stashed in the holding area.
///
/// The hash is taken from the stashed file, which is byte-identical to the
/// pre-deletion content; the stash location rides along in the metadata so
/// undo knows where to restore from.
#[instrument(skip(store, extra))]
pub fn record_delete(
    store: &Store,
    transaction_id: Option<Uuid>,
    source: PathBuf,
    holding_path: &Path,
    extra: BTreeMap<String, String>,
) -> Result<OperationId> {
    let content_hash = fsops::hash_file(holding_path)?;
    let mut metadata = fsops::capture_metadata(holding_path)?;
    metadata.extra = extra;
    metadata.extra.insert(
        HOLDING_PATH_KEY.to_string(),
        holding_path.to_string_lossy().into_owned(),
    );

    let mut op = NewOperation::completed(OpKind::Delete, source, None, Some(content_hash), metadata);
    op.transaction_id = transaction_id;

    let id = append_tracked(store, &op)?;
    info!(id, stash = %holding_path.display(), "recorded delete");
    Ok(id)
}

fn append_tracked(store: &Store, op: &NewOperation) -> Result<OperationId> {
    let id = store.append(op)?;
    if let Some(txn) = op.transaction_id {
        store.increment_transaction_count(txn)?;
    }
    Ok(id)
}

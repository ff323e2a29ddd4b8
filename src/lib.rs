//! `oplog` - durable operation history and undo/redo engine.
//!
//! A file-organization tool performs moves, renames, copies and soft
//! deletes; this crate records every such mutation in a crash-safe SQLite
//! log, groups batches into atomic transactions, and can reverse single
//! operations or whole batches behind a validation gate that re-checks the
//! filesystem against the recorded state before touching anything.
//!
//! See `README.md` for user documentation and `DESIGN.md` for architecture.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fsops;
pub mod history;
pub mod holding;
pub mod model;
pub mod reporter;
pub mod rollback;
pub mod stack;
pub mod store;
pub mod tracker;
pub mod transaction;
pub mod validate;

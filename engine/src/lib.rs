//! Execution engine for Tanks and Taps.
//!
//! Consumes the operations defined in `tnt-primitives` and applies them to
//! a host database: schematic validation at create and update, query
//! evaluation, tap flow with its cascade of triggered openings, and sink
//! flow routing of every release. All multi-step work runs against a
//! copy-on-write staging wrapper and commits atomically, so a failed
//! operation leaves no trace.

mod cow;
mod db;
mod dispatch;
mod error;
mod query;
mod sink_flow;
mod tap_flow;

pub use {
  cow::{CowDb, StateDiff},
  db::{Database, InMemoryChain, StoreAdapter, TankObject},
  dispatch::{apply_operation, OperationOutcome},
  error::{Error, ErrorKind},
  query::QueryEvaluator,
  sink_flow::release_to_sink,
  tap_flow::{evaluate_tap_flow, max_tap_release, TapFlow, TapFlowReport},
};

//! Observer synchronization
//!
//! `hub` owns the observer registry and fans graph changes out to every
//! registered observer; `flow` paces bursts so the best-effort transport is
//! never saturated; `locality` decides when an observer can take the
//! shared-file fast path instead of the wire.

pub mod flow;
pub mod hub;
pub mod locality;

pub use flow::FlowController;
pub use hub::SyncHub;

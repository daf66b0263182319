//! Domain types and pure rules for forecast job tracking.
//!
//! Everything here is free of I/O: the job record and its state machine,
//! request validation and built-in presets, the push/poll reconciliation
//! rule, and the ETA estimator. The store, compute, server and client
//! crates all build on it.

pub mod error;
pub mod eta;
pub mod job;
pub mod job_events;
pub mod preset;
pub mod reconcile;
pub mod types;

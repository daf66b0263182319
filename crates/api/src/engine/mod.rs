//! Job execution engine.
//!
//! Contains the processor that creates forecast jobs, delegates them to the
//! compute backend, and turns each status report into a store write plus a
//! WebSocket notification.

pub mod processor;

pub use processor::{JobProcessor, ProcessorConfig};

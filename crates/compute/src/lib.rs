//! Forecast Compute Service clients.
//!
//! The job processor talks to the (out-of-scope) forecasting backend only
//! through [`ForecastCompute`]: submit a request, then poll the returned
//! handle. [`HttpComputeService`] reaches a remote service over HTTP;
//! [`SimulatedCompute`] plays a fixed sequence of steps for demos and
//! tests when no service is configured.

pub mod http;
pub mod service;
pub mod simulated;

pub use http::HttpComputeService;
pub use service::{ComputeError, ComputeReport, ComputeStatus, ExternalHandle, ForecastCompute};
pub use simulated::SimulatedCompute;

/// Models queried when a request does not name any.
pub const DEFAULT_MODELS: &[&str] = &[
    "x-ai/grok-4-fast:free",
    "deepseek/deepseek-chat-v3.1:free",
    "meta-llama/llama-3.3-70b-instruct:free",
    "qwen/qwen-2.5-72b-instruct:free",
    "mistralai/mistral-nemo:free",
];

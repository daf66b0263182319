//! Request handlers for the `/api/v1` surface.
//!
//! Handlers read through the job store, write only through the job
//! processor, and map errors via [`crate::error::AppError`].

pub mod forecasts;
pub mod jobs;
pub mod models;

//! Client-side job status tracking.
//!
//! [`StatusClient::watch`] follows one job over a WebSocket push channel
//! and falls back to HTTP polling whenever the push channel is down. Both
//! channels feed one merge ([`foresight_core::reconcile::supersedes`]), so
//! the caller sees each state at most once and never a regression.

pub mod error;
pub mod reconnect;
pub mod status;
pub mod transport;

pub use error::ClientError;
pub use reconnect::ReconnectConfig;
pub use status::{JobWatch, StatusClient, StatusClientConfig};
pub use transport::{HttpPoll, PollTransport, PushStream, PushTransport, WsPush};

use foresight_core::types::JobId;

/// Errors raised by the status client transports.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish the push connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A malformed or unexpected frame on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server does not know the job.
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// The server answered with an unexpected status code.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The HTTP request itself failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

//! The two channels a job's status can arrive on.
//!
//! [`PushTransport`] opens a stream of records pushed by the server;
//! [`PollTransport`] fetches the current record on demand. [`WsPush`] and
//! [`HttpPoll`] talk to the Foresight API; tests substitute scripted
//! implementations.

use async_trait::async_trait;
use foresight_core::job::Job;
use foresight_core::job_events::{JobFrame, KEEPALIVE_PONG};
use foresight_core::types::JobId;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ClientError;

/// Records pushed for one job. Ends when the server closes the channel.
pub type PushStream = BoxStream<'static, Result<Job, ClientError>>;

/// Opens push subscriptions.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, id: JobId) -> Result<PushStream, ClientError>;
}

/// Fetches the current record.
#[async_trait]
pub trait PollTransport: Send + Sync {
    /// Fails with [`ClientError::NotFound`] for an unknown job.
    async fn fetch(&self, id: JobId) -> Result<Job, ClientError>;
}

// ---------------------------------------------------------------------------
// WebSocket push
// ---------------------------------------------------------------------------

/// Push channel over `GET /api/v1/ws/jobs/{id}`.
pub struct WsPush {
    ws_url: String,
}

impl WsPush {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:3000`.
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Translate one socket message into a stream item; `None` skips it.
fn decode(
    id: JobId,
    msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<Job, ClientError>> {
    match msg {
        Ok(Message::Text(text)) if text.as_str() == KEEPALIVE_PONG => None,
        Ok(Message::Text(text)) => match serde_json::from_str::<JobFrame>(text.as_str()) {
            Ok(JobFrame::StatusUpdate(job)) => Some(Ok(job)),
            Ok(JobFrame::Error(e)) if e.code == "NOT_FOUND" => {
                Some(Err(ClientError::NotFound(id)))
            }
            Ok(JobFrame::Error(e)) => Some(Err(ClientError::Protocol(e.error))),
            Err(e) => Some(Err(ClientError::Protocol(format!("Invalid frame: {e}")))),
        },
        Ok(_) => None,
        Err(e) => Some(Err(ClientError::Protocol(e.to_string()))),
    }
}

#[async_trait]
impl PushTransport for WsPush {
    async fn connect(&self, id: JobId) -> Result<PushStream, ClientError> {
        let url = format!("{}/api/v1/ws/jobs/{id}", self.ws_url);
        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to {}: {e}", self.ws_url))
        })?;
        tracing::debug!(job_id = %id, "Push channel connected");

        let stream = ws_stream
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(move |msg| future::ready(decode(id, msg)))
            .boxed();
        Ok(stream)
    }
}

// ---------------------------------------------------------------------------
// HTTP poll
// ---------------------------------------------------------------------------

/// Poll channel over `GET /api/v1/jobs/{id}`.
pub struct HttpPoll {
    client: reqwest::Client,
    api_url: String,
}

/// The server's `{ "data": ... }` envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

impl HttpPoll {
    /// * `api_url` - HTTP base URL, e.g. `http://host:3000`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PollTransport for HttpPoll {
    async fn fetch(&self, id: JobId) -> Result<Job, ClientError> {
        let response = self
            .client
            .get(format!("{}/api/v1/jobs/{id}", self.api_url))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<Job> = response.json().await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use foresight_core::job::ForecastRequest;
    use foresight_core::job_events::FrameError;

    use super::*;

    fn job() -> Job {
        Job::new(
            uuid::Uuid::new_v4(),
            ForecastRequest::new("Q", "D"),
            chrono::Utc::now(),
        )
    }

    #[test]
    fn status_frames_decode_to_jobs() {
        let job = job();
        let text = JobFrame::StatusUpdate(job.clone()).to_json();
        assert_matches!(decode(job.id, Ok(Message::Text(text.into()))), Some(Ok(j)) if j == job);
    }

    #[test]
    fn keepalives_and_control_frames_are_skipped() {
        let id = uuid::Uuid::new_v4();
        assert!(decode(id, Ok(Message::Text("pong".into()))).is_none());
        assert!(decode(id, Ok(Message::Ping(Vec::new()))).is_none());
    }

    #[test]
    fn not_found_error_frame_maps_to_not_found() {
        let id = uuid::Uuid::new_v4();
        let text = JobFrame::Error(FrameError {
            code: "NOT_FOUND".into(),
            error: "Job not found".into(),
        })
        .to_json();
        assert_matches!(
            decode(id, Ok(Message::Text(text.into()))),
            Some(Err(ClientError::NotFound(got))) if got == id
        );
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let id = uuid::Uuid::new_v4();
        assert_matches!(
            decode(id, Ok(Message::Text("{not json".into()))),
            Some(Err(ClientError::Protocol(_)))
        );
    }
}

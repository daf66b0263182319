//! Frames exchanged over a job subscription socket.
//!
//! Used by the server when broadcasting job records and by the status
//! client when parsing them.

use serde::{Deserialize, Serialize};

use crate::job::Job;

/// Text keepalive sent by clients.
pub const KEEPALIVE_PING: &str = "ping";

/// Reply to [`KEEPALIVE_PING`].
pub const KEEPALIVE_PONG: &str = "pong";

/// A frame sent over a job subscription socket.
///
/// Serialized as `{"type": "<kind>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobFrame {
    /// Full job record pushed after every state change.
    StatusUpdate(Job),
    /// Subscription could not be served (e.g. unknown job).
    Error(FrameError),
}

/// Payload of an error frame, mirroring the HTTP error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    pub code: String,
    pub error: String,
}

impl JobFrame {
    pub fn to_json(&self) -> String {
        // Serializing plain data structs cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ForecastRequest;

    #[test]
    fn status_update_frame_uses_type_and_data_keys() {
        let job = Job::new(
            uuid::Uuid::new_v4(),
            ForecastRequest::new("Q", "D"),
            chrono::Utc::now(),
        );
        let value: serde_json::Value =
            serde_json::from_str(&JobFrame::StatusUpdate(job.clone()).to_json()).unwrap();

        assert_eq!(value["type"], "status_update");
        assert_eq!(value["data"]["id"], job.id.to_string());
        assert_eq!(value["data"]["status"], "pending");
    }

    #[test]
    fn error_frame_parses() {
        let raw = r#"{"type":"error","data":{"code":"NOT_FOUND","error":"missing"}}"#;
        let frame: JobFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(
            frame,
            JobFrame::Error(FrameError {
                code: "NOT_FOUND".into(),
                error: "missing".into(),
            })
        );
    }
}

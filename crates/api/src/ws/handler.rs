use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use foresight_core::error::CoreError;
use foresight_core::job_events::{FrameError, JobFrame, KEEPALIVE_PING, KEEPALIVE_PONG};
use foresight_core::types::JobId;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/v1/ws/jobs/{id}
///
/// Upgrades the connection and subscribes it to one job's updates.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<JobId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, job_id, state))
}

/// Manage a single job subscription after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Spawns a sender task that forwards messages from the channel.
///   2. Subscribes the connection, which replays the current record.
///   3. Processes inbound messages until either side closes.
///   4. Unsubscribes on disconnect.
async fn handle_socket(socket: WebSocket, job_id: JobId, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "WebSocket connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the sink, stop after Close.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    if let Err(e) = state
        .ws_manager
        .subscribe(job_id, &conn_id, tx.clone(), state.store.as_ref())
        .await
    {
        tracing::debug!(conn_id = %conn_id, job_id = %job_id, error = %e, "Subscription refused");
        let _ = tx.send(Message::Text(error_frame(&e).to_json().into()));
        let _ = tx.send(Message::Close(None));
    }

    // Receiver loop: answer keepalives until the peer or the sender task
    // closes the socket.
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str() == KEEPALIVE_PING => {
                    let _ = tx.send(Message::Text(KEEPALIVE_PONG.into()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    state.ws_manager.unsubscribe(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

fn error_frame(err: &AppError) -> JobFrame {
    let (code, error) = match err {
        AppError::Core(CoreError::NotFound { entity, id }) => {
            ("NOT_FOUND", format!("{entity} with id {id} not found"))
        }
        _ => ("INTERNAL_ERROR", "An internal error occurred".to_string()),
    };
    JobFrame::Error(FrameError {
        code: code.to_string(),
        error,
    })
}

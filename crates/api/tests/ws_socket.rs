//! End-to-end WebSocket tests over a real TCP listener.

mod common;

use std::sync::Arc;
use std::time::Duration;

use foresight_api::router::build_app_router;
use foresight_api::state::AppState;
use foresight_compute::SimulatedCompute;
use foresight_core::job::{ForecastRequest, Job, JobStatus};
use foresight_core::job_events::JobFrame;
use foresight_db::MemoryJobStore;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(base: &str, job_id: impl std::fmt::Display) -> Socket {
    let url = format!("{}/api/v1/ws/jobs/{job_id}", base.replacen("http", "ws", 1));
    let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

/// Next text frame, skipping pings; `None` once the server closes.
async fn next_text(socket: &mut Socket) -> Option<String> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")?
            .ok()?;
        match msg {
            Message::Text(text) => return Some(text.to_string()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

fn status_update(text: &str) -> Job {
    match serde_json::from_str::<JobFrame>(text).unwrap() {
        JobFrame::StatusUpdate(job) => job,
        other => panic!("expected a status update, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test: unknown job yields an error frame and a close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_gets_error_frame_then_close() {
    let (app, _) = common::build_test_app();
    let base = common::spawn_server(app).await;
    let mut socket = connect(&base, uuid::Uuid::new_v4()).await;

    let text = next_text(&mut socket).await.unwrap();
    let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["data"]["code"], "NOT_FOUND");

    assert!(next_text(&mut socket).await.is_none());
}

// ---------------------------------------------------------------------------
// Test: a subscriber follows a job to completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscriber_follows_job_to_completion() {
    let (app, state) = common::build_test_app();
    let base = common::spawn_server(app).await;
    let job = state
        .processor
        .create_job(ForecastRequest::new("Will it rain?", "D"))
        .await
        .unwrap();

    let mut socket = connect(&base, job.id).await;
    let mut frames = Vec::new();
    while let Some(text) = next_text(&mut socket).await {
        frames.push(status_update(&text));
    }

    assert!(!frames.is_empty());
    assert!(frames.windows(2).all(|w| w[0].progress <= w[1].progress));
    let last = frames.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert!(last.result.is_some());
}

// ---------------------------------------------------------------------------
// Test: text ping is answered with pong
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_ping_gets_pong() {
    // A one-minute step keeps the job running for the whole test.
    let mut config = common::test_config();
    config.simulated_step_millis = 60_000;
    let state = AppState::new(
        config.clone(),
        Arc::new(MemoryJobStore::new()),
        Arc::new(SimulatedCompute::new()),
    );
    let base = common::spawn_server(build_app_router(state.clone(), &config)).await;
    let job = state
        .processor
        .create_job(ForecastRequest::new("Q", "D"))
        .await
        .unwrap();

    let mut socket = connect(&base, job.id).await;
    let replay = status_update(&next_text(&mut socket).await.unwrap());
    assert_eq!(replay.id, job.id);

    socket.send(Message::Text("ping".into())).await.unwrap();
    // A status frame may race ahead of the reply.
    let mut reply = next_text(&mut socket).await.unwrap();
    while reply != "pong" {
        status_update(&reply);
        reply = next_text(&mut socket).await.unwrap();
    }
    assert_eq!(reply, "pong");
}

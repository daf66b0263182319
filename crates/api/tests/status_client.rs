//! The status client against a live server: push over the real WebSocket
//! route with the HTTP poll route as fallback.

mod common;

use foresight_client::{StatusClient, StatusClientConfig};
use foresight_core::job::{ForecastRequest, JobStatus};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Test: a watch follows a job to completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watch_follows_job_to_completion() {
    let (app, state) = common::build_test_app();
    let base = common::spawn_server(app).await;
    let job = state
        .processor
        .create_job(ForecastRequest::new("Will it rain?", "D"))
        .await
        .unwrap();

    let client = StatusClient::for_server(&base, StatusClientConfig::default());
    let mut watch = client.watch(job.id);

    let mut seen = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(10), watch.next())
            .await
            .expect("timed out waiting for an update");
        match next {
            Some(job) => seen.push(job),
            None => break,
        }
    }

    assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));
    let last = seen.last().unwrap();
    assert_eq!(last.id, job.id);
    assert_eq!(last.status, JobStatus::Completed);
    assert!(last.result.is_some());
}

// ---------------------------------------------------------------------------
// Test: watching an unknown job ends the stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watch_of_unknown_job_ends_without_updates() {
    let (app, _) = common::build_test_app();
    let base = common::spawn_server(app).await;

    let client = StatusClient::for_server(&base, StatusClientConfig::default());
    let mut watch = client.watch(uuid::Uuid::new_v4());

    let next = tokio::time::timeout(Duration::from_secs(10), watch.next())
        .await
        .expect("timed out waiting for the watch to end");
    assert!(next.is_none());
}

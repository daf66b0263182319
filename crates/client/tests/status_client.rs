//! Timing tests for `StatusClient` against scripted transports.
//!
//! All tests run on paused Tokio time, so intervals and backoff delays are
//! exact and the runtime advances the clock whenever every task is idle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foresight_client::{
    ClientError, PollTransport, PushStream, PushTransport, StatusClient, StatusClientConfig,
};
use foresight_core::job::{ForecastRequest, Job, JobStatus};
use foresight_core::types::JobId;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// What the next push connection does.
enum Script {
    /// Deliver these results, then end the stream (a disconnect).
    Deliver(Vec<Result<Job, ClientError>>),
    /// Deliver these records, then stay open.
    Hold(Vec<Job>),
    /// Fail to connect.
    Refuse,
}

#[derive(Default)]
struct FakePush {
    scripts: Mutex<VecDeque<Script>>,
    attempts: Mutex<Vec<Instant>>,
}

impl FakePush {
    fn scripted(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for FakePush {
    async fn connect(&self, _id: JobId) -> Result<PushStream, ClientError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Refuse);
        match script {
            Script::Deliver(items) => Ok(stream::iter(items).boxed()),
            Script::Hold(jobs) => Ok(stream::iter(jobs.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Script::Refuse => Err(ClientError::Connection("refused".into())),
        }
    }
}

/// Replays queued responses, then repeats the last record forever.
#[derive(Default)]
struct FakePoll {
    responses: Mutex<VecDeque<Result<Job, ClientError>>>,
    last: Mutex<Option<Job>>,
    calls: AtomicUsize,
}

impl FakePoll {
    fn scripted(responses: Vec<Result<Job, ClientError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollTransport for FakePoll {
    async fn fetch(&self, id: JobId) -> Result<Job, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(job)) => {
                *self.last.lock().unwrap() = Some(job.clone());
                Ok(job)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or(ClientError::NotFound(id)),
        }
    }
}

/// Builds records of one job at `base + secs`.
struct Records {
    id: JobId,
    base: DateTime<Utc>,
}

impl Records {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            base: Utc::now(),
        }
    }

    fn at(&self, secs: i64, status: JobStatus, progress: f64) -> Job {
        let mut job = Job::new(self.id, ForecastRequest::new("Q", "D"), self.base);
        job.status = status;
        job.progress = progress;
        job.updated_at = self.base + chrono::Duration::seconds(secs);
        if status == JobStatus::Completed {
            job.result = Some(serde_json::json!({"ensemble_probability": 0.4}));
        }
        job
    }

    fn running(&self, secs: i64, progress: f64) -> Job {
        self.at(secs, JobStatus::Running, progress)
    }

    fn completed(&self, secs: i64) -> Job {
        self.at(secs, JobStatus::Completed, 1.0)
    }
}

fn client(push: Arc<FakePush>, poll: Arc<FakePoll>) -> StatusClient {
    StatusClient::new(push, poll, StatusClientConfig::default())
}

async fn drain(watch: &mut foresight_client::JobWatch) -> Vec<Job> {
    let mut jobs = Vec::new();
    while let Some(job) = watch.next().await {
        jobs.push(job);
    }
    jobs
}

fn progress(jobs: &[Job]) -> Vec<f64> {
    jobs.iter().map(|j| j.progress).collect()
}

// ---------------------------------------------------------------------------
// Handover
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_then_poll_handover_emits_each_state_once() {
    let r = Records::new();
    let push = FakePush::scripted(vec![Script::Deliver(vec![Ok(r.running(1, 0.4))])]);
    let poll = FakePoll::scripted(vec![Ok(r.running(2, 0.6))]);
    let mut watch = client(push, poll.clone()).watch(r.id);

    let first = watch.next().await.unwrap();
    let second = watch.next().await.unwrap();
    assert_eq!(progress(&[first, second]), vec![0.4, 0.6]);

    // Polling keeps returning 0.6; nothing new is emitted.
    let quiet = tokio::time::timeout(Duration::from_secs(10), watch.next()).await;
    assert!(quiet.is_err());
    assert!(poll.calls() > 1);

    watch.cancel().await;
}

#[tokio::test(start_paused = true)]
async fn push_drop_triggers_immediate_poll() {
    let r = Records::new();
    let push = FakePush::scripted(vec![Script::Deliver(vec![Ok(r.running(1, 0.4))])]);
    let poll = FakePoll::scripted(vec![Ok(r.running(2, 0.6))]);
    let mut watch = client(push, poll).watch(r.id);

    let start = Instant::now();
    watch.next().await.unwrap();
    watch.next().await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);

    watch.cancel().await;
}

#[tokio::test(start_paused = true)]
async fn reconnected_push_takes_over_from_polling() {
    let r = Records::new();
    let push = FakePush::scripted(vec![
        Script::Deliver(vec![Ok(r.running(1, 0.2))]),
        Script::Hold(vec![r.running(3, 0.5)]),
    ]);
    let poll = FakePoll::scripted(vec![Ok(r.running(2, 0.3))]);
    let mut watch = client(push.clone(), poll.clone()).watch(r.id);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(watch.next().await.unwrap());
    }
    assert_eq!(progress(&seen), vec![0.2, 0.3, 0.5]);

    // Push is open again: the ticker stays paused.
    let calls = poll.calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(poll.calls(), calls);
    assert_eq!(push.attempts().len(), 2);

    watch.cancel().await;
}

// ---------------------------------------------------------------------------
// Single channel
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_only_run_never_polls() {
    let r = Records::new();
    let push = FakePush::scripted(vec![Script::Hold(vec![
        r.running(1, 0.2),
        r.running(2, 0.5),
        r.completed(3),
    ])]);
    let poll = FakePoll::scripted(vec![]);
    let mut watch = client(push, poll.clone()).watch(r.id);

    let jobs = drain(&mut watch).await;
    assert_eq!(progress(&jobs), vec![0.2, 0.5, 1.0]);
    assert_eq!(jobs.last().unwrap().status, JobStatus::Completed);
    assert_eq!(poll.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn polling_drives_watch_when_push_is_unavailable() {
    let r = Records::new();
    let push = FakePush::scripted(vec![]);
    let poll = FakePoll::scripted(vec![
        Ok(r.running(1, 0.3)),
        Ok(r.running(1, 0.3)),
        Ok(r.running(2, 0.7)),
        Ok(r.completed(3)),
    ]);
    let mut watch = client(push, poll.clone()).watch(r.id);

    let start = Instant::now();
    let jobs = drain(&mut watch).await;
    assert_eq!(progress(&jobs), vec![0.3, 0.7, 1.0]);
    assert_eq!(poll.calls(), 4);
    // First tick is one interval out, then one per interval.
    assert_eq!(start.elapsed(), Duration::from_secs(8));
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stale_poll_records_are_ignored() {
    let r = Records::new();
    let push = FakePush::scripted(vec![]);
    let poll = FakePoll::scripted(vec![
        Ok(r.running(2, 0.5)),
        Ok(r.running(1, 0.3)),
        Ok(r.completed(3)),
    ]);
    let mut watch = client(push, poll).watch(r.id);

    let jobs = drain(&mut watch).await;
    assert_eq!(progress(&jobs), vec![0.5, 1.0]);
}

#[tokio::test(start_paused = true)]
async fn terminal_record_ends_both_channels() {
    let r = Records::new();
    let push = FakePush::scripted(vec![Script::Deliver(vec![Ok(r.completed(1))])]);
    let poll = FakePoll::scripted(vec![Ok(r.running(2, 0.9))]);
    let mut watch = client(push.clone(), poll.clone()).watch(r.id);

    let jobs = drain(&mut watch).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(poll.calls(), 0);
    assert_eq!(push.attempts().len(), 1);
}

// ---------------------------------------------------------------------------
// Unknown jobs and errors
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn poll_not_found_ends_watch() {
    let r = Records::new();
    let push = FakePush::scripted(vec![]);
    let poll = FakePoll::scripted(vec![Err(ClientError::NotFound(r.id))]);
    let mut watch = client(push, poll).watch(r.id);

    assert!(watch.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn push_not_found_ends_watch() {
    let r = Records::new();
    let push = FakePush::scripted(vec![Script::Deliver(vec![Err(ClientError::NotFound(r.id))])]);
    let poll = FakePoll::scripted(vec![]);
    let mut watch = client(push, poll.clone()).watch(r.id);

    assert!(watch.next().await.is_none());
    assert_eq!(poll.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried() {
    let r = Records::new();
    let push = FakePush::scripted(vec![]);
    let poll = FakePoll::scripted(vec![
        Err(ClientError::Api {
            status: 500,
            body: "boom".into(),
        }),
        Ok(r.completed(1)),
    ]);
    let mut watch = client(push, poll).watch(r.id);

    let jobs = drain(&mut watch).await;
    assert_eq!(progress(&jobs), vec![1.0]);
}

// ---------------------------------------------------------------------------
// Backoff and cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_reconnects_back_off_exponentially() {
    let r = Records::new();
    let push = FakePush::scripted(vec![]);
    let poll = FakePoll::scripted(vec![Ok(r.running(1, 0.1))]);
    let watch = client(push.clone(), poll).watch(r.id);

    tokio::time::sleep(Duration::from_secs(20)).await;
    let attempts = push.attempts();
    let gaps: Vec<u64> = attempts
        .windows(2)
        .map(|w| (w[1] - w[0]).as_secs())
        .collect();
    assert_eq!(&gaps[..4], &[1, 2, 4, 8]);

    watch.cancel().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_all_activity() {
    let r = Records::new();
    let push = FakePush::scripted(vec![]);
    let poll = FakePoll::scripted(vec![Ok(r.running(1, 0.1))]);
    let mut watch = client(push.clone(), poll.clone()).watch(r.id);

    assert_eq!(watch.next().await.unwrap().progress, 0.1);
    watch.cancel().await;

    let (calls, attempts) = (poll.calls(), push.attempts().len());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(poll.calls(), calls);
    assert_eq!(push.attempts().len(), attempts);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_watch_cancels_it() {
    let r = Records::new();
    let push = FakePush::scripted(vec![]);
    let poll = FakePoll::scripted(vec![Ok(r.running(1, 0.1))]);
    let mut watch = client(push, poll.clone()).watch(r.id);

    watch.next().await.unwrap();
    drop(watch);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let calls = poll.calls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(poll.calls(), calls);
}

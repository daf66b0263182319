//! Merging push and poll into one status stream for a job.
//!
//! The watch task has two modes:
//!
//! - **Channel-active**: a push stream is open. Every pushed record is
//!   offered to the merge and the poll ticker is paused.
//! - **Polling**: no push stream is open. The ticker fetches the record
//!   every `poll_interval` (immediately after the push stream drops) while
//!   reconnects are attempted with exponential backoff.
//!
//! A terminal record from either channel ends both.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use foresight_core::job::Job;
use foresight_core::reconcile::supersedes;
use foresight_core::types::JobId;
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::reconnect::{next_delay, ReconnectConfig};
use crate::transport::{HttpPoll, PollTransport, PushStream, PushTransport, WsPush};

/// Default interval between polls while the push channel is down.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Tuning for [`StatusClient`].
#[derive(Debug, Clone)]
pub struct StatusClientConfig {
    pub poll_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for StatusClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Follows jobs over a push channel with a polling fallback.
#[derive(Clone)]
pub struct StatusClient {
    push: Arc<dyn PushTransport>,
    poll: Arc<dyn PollTransport>,
    config: StatusClientConfig,
}

impl StatusClient {
    pub fn new(
        push: Arc<dyn PushTransport>,
        poll: Arc<dyn PollTransport>,
        config: StatusClientConfig,
    ) -> Self {
        Self { push, poll, config }
    }

    /// Client for a Foresight API server at `base_url` (e.g.
    /// `http://host:3000`), pushing over `ws://` and polling over `http://`.
    pub fn for_server(base_url: &str, config: StatusClientConfig) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let ws_url = if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base_url.to_string()
        };
        Self::new(
            Arc::new(WsPush::new(ws_url)),
            Arc::new(HttpPoll::new(base_url.to_string())),
            config,
        )
    }

    /// Start following `id`. Records arrive through [`JobWatch::next`].
    pub fn watch(&self, id: JobId) -> JobWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let watcher = Watcher {
            id,
            push: Arc::clone(&self.push),
            poll: Arc::clone(&self.poll),
            config: self.config.clone(),
            cancel: cancel.clone(),
            tx,
            current: None,
        };
        let task = tokio::spawn(watcher.run());
        JobWatch {
            updates: rx,
            cancel,
            task: Some(task),
        }
    }
}

/// Handle to a running watch.
///
/// Dropping it cancels the watch; use [`JobWatch::cancel`] to also wait for
/// the task to exit.
pub struct JobWatch {
    updates: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl JobWatch {
    /// Next record that supersedes everything seen so far. `None` once the
    /// job is terminal, unknown to the server, or the watch was cancelled.
    pub async fn next(&mut self) -> Option<Job> {
        self.updates.recv().await
    }

    /// Stop both channels and wait for the task to exit.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Await the future in `slot`, or never resolve when the slot is empty.
async fn await_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// Next item of the push stream, or never resolve when none is open.
async fn next_pushed(push: &mut Option<PushStream>) -> Option<Result<Job, ClientError>> {
    match push {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// State of one watch task.
struct Watcher {
    id: JobId,
    push: Arc<dyn PushTransport>,
    poll: Arc<dyn PollTransport>,
    config: StatusClientConfig,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<Job>,
    /// Latest emitted record.
    current: Option<Job>,
}

/// Whether the watch loop should keep going.
enum Flow {
    Continue,
    Stop,
}

impl Watcher {
    fn connect(&self) -> BoxFuture<'static, Result<PushStream, ClientError>> {
        let push = Arc::clone(&self.push);
        let id = self.id;
        Box::pin(async move { push.connect(id).await })
    }

    /// Emit `job` if it supersedes the current view.
    fn offer(&mut self, job: Job) -> Flow {
        if !supersedes(self.current.as_ref(), &job) {
            return Flow::Continue;
        }
        let terminal = job.is_terminal();
        if self.tx.send(job.clone()).is_err() {
            return Flow::Stop;
        }
        self.current = Some(job);
        if terminal {
            tracing::debug!(job_id = %self.id, "Job reached a terminal state");
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    async fn run(mut self) {
        let poll_interval = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut push: Option<PushStream> = None;
        let mut connecting: Option<BoxFuture<'static, Result<PushStream, ClientError>>> =
            Some(self.connect());
        let mut backoff: Option<Pin<Box<Sleep>>> = None;
        let mut delay = self.config.reconnect.initial_delay;

        loop {
            let flow = tokio::select! {
                _ = self.cancel.cancelled() => Flow::Stop,

                item = next_pushed(&mut push), if push.is_some() => match item {
                    Some(Ok(job)) => self.offer(job),
                    Some(Err(ClientError::NotFound(_))) => {
                        tracing::warn!(job_id = %self.id, "Job not found on push channel");
                        Flow::Stop
                    }
                    other => {
                        if let Some(Err(e)) = other {
                            tracing::warn!(job_id = %self.id, error = %e, "Push channel error");
                        }
                        tracing::debug!(job_id = %self.id, "Push channel dropped, polling");
                        push = None;
                        ticker.reset_immediately();
                        backoff = Some(Box::pin(tokio::time::sleep(delay)));
                        delay = next_delay(delay, &self.config.reconnect);
                        Flow::Continue
                    }
                },

                result = await_slot(&mut connecting), if connecting.is_some() => {
                    connecting = None;
                    match result {
                        Ok(stream) => {
                            push = Some(stream);
                            delay = self.config.reconnect.initial_delay;
                        }
                        Err(e) => {
                            tracing::debug!(
                                job_id = %self.id,
                                error = %e,
                                retry_ms = delay.as_millis() as u64,
                                "Push connect failed",
                            );
                            backoff = Some(Box::pin(tokio::time::sleep(delay)));
                            delay = next_delay(delay, &self.config.reconnect);
                        }
                    }
                    Flow::Continue
                }

                _ = await_slot(&mut backoff), if backoff.is_some() => {
                    backoff = None;
                    connecting = Some(self.connect());
                    Flow::Continue
                }

                _ = ticker.tick(), if push.is_none() => {
                    let fetched = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        fetched = self.poll.fetch(self.id) => fetched,
                    };
                    match fetched {
                        Ok(job) => self.offer(job),
                        Err(ClientError::NotFound(_)) => {
                            tracing::warn!(job_id = %self.id, "Job not found, stopping watch");
                            Flow::Stop
                        }
                        Err(e) => {
                            tracing::warn!(job_id = %self.id, error = %e, "Poll failed, retrying");
                            Flow::Continue
                        }
                    }
                }
            };

            if let Flow::Stop = flow {
                break;
            }
        }
    }
}

use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::extract::ws::Message;
use foresight_core::error::CoreError;
use foresight_core::job::Job;
use foresight_core::job_events::JobFrame;
use foresight_core::types::JobId;
use foresight_db::JobStore;
use tokio::sync::{mpsc, RwLock};

use crate::error::AppResult;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Outcome of [`WsManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// The current record was sent and the connection will receive updates.
    Registered,
    /// The job had already finished: the final record and a Close frame
    /// were sent and the connection was not registered.
    Finished,
}

#[derive(Default)]
struct Registry {
    /// job id -> (connection id -> sender)
    subscribers: HashMap<JobId, HashMap<String, WsSender>>,
    /// connection id -> subscribed job ids
    jobs_by_conn: HashMap<String, HashSet<JobId>>,
}

impl Registry {
    fn remove_pair(&mut self, job_id: JobId, conn_id: &str) {
        if let Some(conns) = self.subscribers.get_mut(&job_id) {
            conns.remove(conn_id);
            if conns.is_empty() {
                self.subscribers.remove(&job_id);
            }
        }
        if let Some(jobs) = self.jobs_by_conn.get_mut(conn_id) {
            jobs.remove(&job_id);
            if jobs.is_empty() {
                self.jobs_by_conn.remove(conn_id);
            }
        }
    }
}

/// Registry of WebSocket connections subscribed to job updates.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// owned by the application state.
pub struct WsManager {
    registry: RwLock<Registry>,
}

fn status_frame(job: &Job) -> Message {
    Message::Text(JobFrame::StatusUpdate(job.clone()).to_json().into())
}

impl WsManager {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Subscribe `conn_id` to updates of `job_id`.
    ///
    /// The current record is read and sent while the registry write lock is
    /// held, so no broadcast can slip in between the replay and the
    /// registration. Fails with [`CoreError::NotFound`] for an unknown job.
    pub async fn subscribe(
        &self,
        job_id: JobId,
        conn_id: &str,
        sender: WsSender,
        store: &dyn JobStore,
    ) -> AppResult<Subscription> {
        let mut registry = self.registry.write().await;

        let job = store
            .get(job_id)
            .await?
            .ok_or_else(|| CoreError::job_not_found(job_id))?;

        let _ = sender.send(status_frame(&job));
        if job.is_terminal() {
            let _ = sender.send(Message::Close(None));
            return Ok(Subscription::Finished);
        }

        registry
            .subscribers
            .entry(job_id)
            .or_default()
            .insert(conn_id.to_string(), sender);
        registry
            .jobs_by_conn
            .entry(conn_id.to_string())
            .or_default()
            .insert(job_id);

        tracing::debug!(job_id = %job_id, conn_id = %conn_id, "WebSocket subscribed");
        Ok(Subscription::Registered)
    }

    /// Remove a connection from every job it is subscribed to.
    ///
    /// Unknown connection ids are a no-op.
    pub async fn unsubscribe(&self, conn_id: &str) {
        let mut registry = self.registry.write().await;
        let Some(jobs) = registry.jobs_by_conn.get(conn_id).cloned() else {
            return;
        };
        for job_id in jobs {
            registry.remove_pair(job_id, conn_id);
        }
    }

    /// Send the full record to every subscriber of `job_id`.
    ///
    /// Connections whose send channels are closed are pruned. Delivery
    /// failures never surface to the caller. When the job is terminal every
    /// subscriber also receives a Close frame and the job's set is dropped.
    pub async fn broadcast(&self, job_id: JobId, job: &Job) {
        let mut registry = self.registry.write().await;
        let Some(conns) = registry.subscribers.get(&job_id) else {
            return;
        };

        let frame = status_frame(job);
        let terminal = job.is_terminal();
        let mut dropped = Vec::new();
        for (conn_id, sender) in conns {
            let delivered = sender.send(frame.clone()).is_ok()
                && (!terminal || sender.send(Message::Close(None)).is_ok());
            if !delivered || terminal {
                dropped.push(conn_id.clone());
            }
        }

        for conn_id in &dropped {
            registry.remove_pair(job_id, conn_id);
        }
        if terminal {
            tracing::debug!(job_id = %job_id, count = dropped.len(), "Closed job subscribers");
        }
    }

    /// Send a Close frame to every subscriber of `job_id` and drop them.
    /// Used when the job record is deleted.
    pub async fn close_job(&self, job_id: JobId) {
        let mut registry = self.registry.write().await;
        let Some(conns) = registry.subscribers.get(&job_id) else {
            return;
        };

        let closed: Vec<String> = conns
            .iter()
            .map(|(conn_id, sender)| {
                let _ = sender.send(Message::Close(None));
                conn_id.clone()
            })
            .collect();
        for conn_id in &closed {
            registry.remove_pair(job_id, conn_id);
        }
        tracing::debug!(job_id = %job_id, count = closed.len(), "Closed subscribers of deleted job");
    }

    /// Number of distinct connections with at least one subscription.
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.jobs_by_conn.len()
    }

    /// Number of connections subscribed to `job_id`.
    pub async fn subscriber_count(&self, job_id: JobId) -> usize {
        self.registry
            .read()
            .await
            .subscribers
            .get(&job_id)
            .map_or(0, HashMap::len)
    }

    /// Send a Ping frame to every subscribed connection.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let registry = self.registry.read().await;
        for sender in unique_senders(&registry) {
            let _ = sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the registry.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// process exits.
    pub async fn shutdown_all(&self) {
        let mut registry = self.registry.write().await;
        let count = registry.jobs_by_conn.len();
        for sender in unique_senders(&registry) {
            let _ = sender.send(Message::Close(None));
        }
        registry.subscribers.clear();
        registry.jobs_by_conn.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

/// One sender per connection, however many jobs it watches.
fn unique_senders(registry: &Registry) -> Vec<&WsSender> {
    let mut seen = HashSet::new();
    registry
        .subscribers
        .values()
        .flat_map(|conns| conns.iter())
        .filter(|&(conn_id, _)| seen.insert(conn_id.as_str()))
        .map(|(_, sender)| sender)
        .collect()
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

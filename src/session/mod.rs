//! Session lifecycle for the streamable HTTP transport
//!
//! A session is created by an `initialize` request, looked up by its
//! `mcp-session-id` on every later request, and removed exactly once when it
//! is closed by the client, expires, or the server shuts down.

mod handle;
mod store;

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

pub use handle::{SessionHandle, SessionState};
pub use store::{InMemorySessionStore, SessionStore};

use crate::errors::AppError;

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientRequest,
    IdleTimeout,
    Shutdown,
    Aborted,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ClientRequest => "client_request",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
            Self::Aborted => "aborted",
        };
        f.write_str(reason)
    }
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    idle_timeout: Option<Duration>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, idle_timeout: Option<Duration>) -> Self {
        Self {
            store,
            idle_timeout,
        }
    }

    pub fn in_memory(idle_timeout: Option<Duration>) -> Self {
        Self::new(Arc::new(InMemorySessionStore::new()), idle_timeout)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Creates and stores a session under a freshly generated id.
    pub async fn open(
        &self,
        protocol_version: &str,
        client_name: Option<String>,
    ) -> Result<Arc<SessionHandle>, AppError> {
        let id = Uuid::new_v4().to_string();
        let handle = Arc::new(SessionHandle::new(id.clone(), protocol_version, client_name));

        if !self.store.put(id.clone(), handle.clone()).await {
            return Err(AppError::internal(format!(
                "session id {id} is already in use"
            )));
        }

        info!(
            session_id = %id,
            protocol_version = %protocol_version,
            client = handle.client_name().unwrap_or("-"),
            "session opened"
        );
        Ok(handle)
    }

    /// Looks up an active session and refreshes its idle clock. Expired
    /// sessions are closed on the spot and reported as unknown.
    pub async fn resolve(&self, id: &str) -> Option<Arc<SessionHandle>> {
        let handle = self.store.get(id).await?;

        if self.is_expired(&handle, Utc::now()) {
            self.terminate(id, CloseReason::IdleTimeout).await;
            return None;
        }
        if !handle.is_active() {
            return None;
        }

        handle.touch();
        Some(handle)
    }

    /// Removes the session from the store and closes its handle. Returns
    /// false when the session was not present.
    pub async fn terminate(&self, id: &str, reason: CloseReason) -> bool {
        let Some(handle) = self.store.remove(id).await else {
            debug!(session_id = %id, reason = %reason, "close requested for unknown session");
            return false;
        };

        handle.close();
        let age_secs = (Utc::now() - handle.created_at()).num_seconds();
        info!(session_id = %id, reason = %reason, age_secs, "session closed");
        true
    }

    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        if self.idle_timeout.is_none() {
            return 0;
        }

        let mut closed = 0;
        for handle in self.store.snapshot().await {
            if self.is_expired(&handle, now)
                && self.terminate(handle.id(), CloseReason::IdleTimeout).await
            {
                closed += 1;
            }
        }
        closed
    }

    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for handle in self.store.snapshot().await {
            if self.terminate(handle.id(), CloseReason::Shutdown).await {
                closed += 1;
            }
        }
        closed
    }

    pub async fn active_count(&self) -> usize {
        self.store.count().await
    }

    /// Starts the background task that evicts idle sessions. Nothing is
    /// spawned when expiry is disabled.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let timeout = self.idle_timeout?;
        let period = (timeout / 4).clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        let manager = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let closed = manager.sweep_expired().await;
                if closed > 0 {
                    info!(closed, "expired idle sessions");
                }
            }
        }))
    }

    fn is_expired(&self, handle: &SessionHandle, now: DateTime<Utc>) -> bool {
        let Some(timeout) = self.idle_timeout else {
            return false;
        };
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        handle.idle_millis_at(now) > timeout_ms
    }
}

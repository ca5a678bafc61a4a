use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

const NOTIFICATION_CAPACITY: usize = 64;

const STATE_ACTIVE: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle of a stored session. A session that was never initialized has
/// no handle at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closed,
}

/// Per-session transport handle shared by every request carrying the
/// session's id.
#[derive(Debug)]
pub struct SessionHandle {
    id: String,
    protocol_version: String,
    client_name: Option<String>,
    created_at: DateTime<Utc>,
    last_seen_ms: AtomicI64,
    state: AtomicU8,
    initialize_answered: AtomicBool,
    notifications: broadcast::Sender<String>,
}

impl SessionHandle {
    pub fn new(
        id: impl Into<String>,
        protocol_version: impl Into<String>,
        client_name: Option<String>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let now = Utc::now();
        Self {
            id: id.into(),
            protocol_version: protocol_version.into(),
            client_name,
            created_at: now,
            last_seen_ms: AtomicI64::new(now.timestamp_millis()),
            state: AtomicU8::new(STATE_ACTIVE),
            initialize_answered: AtomicBool::new(false),
            notifications,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            STATE_ACTIVE => SessionState::Active,
            _ => SessionState::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn touch(&self) {
        self.last_seen_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn idle_millis_at(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis()
            .saturating_sub(self.last_seen_ms.load(Ordering::Relaxed))
            .max(0)
    }

    /// Returns true only for the first `initialize` answered on this session.
    pub fn begin_initialize(&self) -> bool {
        !self.initialize_answered.swap(true, Ordering::AcqRel)
    }

    /// Moves the handle to `Closed`. Returns false when it was already closed.
    pub fn close(&self) -> bool {
        self.state.swap(STATE_CLOSED, Ordering::AcqRel) == STATE_ACTIVE
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notifications.subscribe()
    }

    /// Publishes a JSON-RPC notification to every open event stream of this
    /// session and returns how many streams received it.
    pub fn notify(&self, message: &Value) -> usize {
        if !self.is_active() {
            return 0;
        }
        self.notifications.send(message.to_string()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn close_is_idempotent() {
        let handle = SessionHandle::new("abc", "2025-06-18", None);
        assert_eq!(handle.state(), SessionState::Active);
        assert!(handle.close());
        assert!(!handle.close());
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[test]
    fn only_first_initialize_is_accepted() {
        let handle = SessionHandle::new("abc", "2025-06-18", None);
        assert!(handle.begin_initialize());
        assert!(!handle.begin_initialize());
    }

    #[test]
    fn idle_time_grows_from_last_touch() {
        let handle = SessionHandle::new("abc", "2025-06-18", None);
        let later = Utc::now() + chrono::Duration::seconds(90);
        assert!(handle.idle_millis_at(later) >= 89_000);
    }

    #[tokio::test]
    async fn notifications_reach_subscribers_until_closed() {
        let handle = SessionHandle::new("abc", "2025-06-18", Some("client".to_string()));
        let mut receiver = handle.subscribe();

        let delivered = handle.notify(&json!({"jsonrpc": "2.0", "method": "notifications/message"}));
        assert_eq!(delivered, 1);
        let message = receiver.recv().await.expect("notification");
        assert!(message.contains("notifications/message"));

        handle.close();
        assert_eq!(handle.notify(&json!({"method": "ignored"})), 0);
    }

    #[test]
    fn notify_without_subscribers_is_dropped() {
        let handle = SessionHandle::new("abc", "2025-06-18", None);
        assert_eq!(handle.notify(&json!({"method": "nobody"})), 0);
    }
}

//! Per-session context
//!
//! Everything a user builds up while working on one property lives here and
//! is passed explicitly into each operation. Nothing is persisted: dropping a
//! session (or restarting the process) discards it. Sessions left untouched
//! longer than the idle TTL are evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chat::ChatSession;
use crate::config::{DEFAULT_SESSION_IDLE_TTL_SECS, DEFAULT_STREAM_IDLE_TIMEOUT_SECS};
use crate::error::DashboardError;
use crate::models::{ImageAttachment, NarrativeReport, PropertyInputs};
use crate::Result;

/// Form state of one session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub inputs: PropertyInputs,
    /// Last successful photo analysis
    pub narrative: Option<NarrativeReport>,
    pub logo: Option<ImageAttachment>,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            inputs: PropertyInputs::default(),
            narrative: None,
            logo: None,
            created_at: Utc::now(),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle; the chat mutex is held for a whole turn so turns run in
/// arrival order without blocking form updates.
pub struct SessionHandle {
    pub id: Uuid,
    pub context: RwLock<SessionContext>,
    pub chat: Arc<Mutex<ChatSession>>,
    last_seen: std::sync::Mutex<Instant>,
}

impl SessionHandle {
    fn new(id: Uuid, chat: ChatSession) -> Self {
        Self {
            id,
            context: RwLock::new(SessionContext::new()),
            chat: Arc::new(Mutex::new(chat)),
            last_seen: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        let mut last_seen = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        *last_seen = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// A turn in flight holds the chat lock
    fn is_chatting(&self) -> bool {
        self.chat.try_lock().is_err()
    }
}

/// In-memory session registry
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionHandle>>>>,
    idle_ttl: Duration,
    stream_idle_timeout: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_limits(
            Duration::from_secs(DEFAULT_SESSION_IDLE_TTL_SECS),
            Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        )
    }

    pub fn with_limits(idle_ttl: Duration, stream_idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
            stream_idle_timeout,
        }
    }

    pub async fn create(&self) -> Arc<SessionHandle> {
        self.evict_idle().await;

        let id = Uuid::new_v4();
        let chat = ChatSession::new().with_idle_timeout(self.stream_idle_timeout);
        let handle = Arc::new(SessionHandle::new(id, chat));

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, handle.clone());
        info!(session_id = %id, active = sessions.len(), "Session created");

        handle
    }

    /// Look a session up and mark it as used
    pub async fn get(&self, id: Uuid) -> Result<Arc<SessionHandle>> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(&id)
            .cloned()
            .ok_or(DashboardError::SessionNotFound(id))?;
        handle.touch();
        Ok(handle)
    }

    /// Drop sessions idle past the TTL; returns how many went
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| handle.idle_for() < self.idle_ttl || handle.is_chatting());

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, active = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }

    /// Periodic eviction for the lifetime of the server
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let every = store
            .idle_ttl
            .clamp(Duration::from_secs(1), Duration::from_secs(60));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle().await;
                debug!(evicted, "Session sweep done");
            }
        })
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(&id).is_none() {
            return Err(DashboardError::SessionNotFound(id));
        }

        info!(session_id = %id, active = sessions.len(), "Session discarded");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Runtime for executing quiz sessions
//!
//! Every (chat, user) session runs as its own actor task. The store only
//! tracks handles; all session state lives inside the actors.

mod executor;
mod leaderboard;
mod timer;
pub mod traits;

#[cfg(test)]
pub mod testing;

#[allow(unused_imports)] // Public API re-exports
pub use leaderboard::{Leaderboard, TopScore};
#[allow(unused_imports)] // Public API re-exports
pub use timer::{TimerCoordinator, TimerKind, TimerStats};
pub use traits::{Transport, TransportError};

use executor::{Envelope, SessionRuntime};

use crate::bank::QuestionBank;
use crate::config::QuizConfig;
use crate::state_machine::{
    ChatId, Event, Session, SessionContext, SessionKey, SessionSnapshot, StopReason,
    TransitionError, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

const MAILBOX_CAPACITY: usize = 32;

/// Why an event could not be handed to a session
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session has ended")]
    Closed,
    #[error(transparent)]
    Rejected(#[from] TransitionError),
}

/// Handle to interact with a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    mailbox: mpsc::Sender<Envelope>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Queue an event and wait until the session has fully processed it
    pub async fn deliver(&self, event: Event) -> Result<(), SessionError> {
        let (envelope, ack) = Envelope::with_ack(event);
        self.mailbox
            .send(envelope)
            .await
            .map_err(|_| SessionError::Closed)?;
        ack.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    /// Queue an event without waiting for it, as a timer would
    #[allow(dead_code)] // Used by tests to inject late timer firings
    pub async fn post(&self, event: Event) -> Result<(), SessionError> {
        self.mailbox
            .send(Envelope::new(event))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Latest state published by the session
    pub fn snapshot(&self) -> SessionSnapshot {
        *self.snapshot.borrow()
    }
}

struct SessionEntry {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl SessionEntry {
    /// Stop the actor and wait for it to exit, so none of its timers survive
    async fn shutdown(self, key: SessionKey, reason: StopReason) {
        let SessionEntry { handle, task } = self;
        if let Err(e) = handle.deliver(Event::Stop { reason }).await {
            tracing::debug!(session = %key, error = %e, "Session already ended before stop");
        }
        drop(handle);
        if let Err(e) = task.await {
            tracing::error!(session = %key, error = %e, "Session task failed");
        }
    }
}

/// What an administrative reset removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSummary {
    pub sessions: usize,
    pub top_score: Option<TopScore>,
}

impl ResetSummary {
    pub fn had_data(&self) -> bool {
        self.sessions > 0 || self.top_score.is_some()
    }
}

/// Registry of live sessions plus the shared leaderboard
pub struct SessionStore<T: Transport + 'static> {
    bank: Arc<QuestionBank>,
    config: Arc<QuizConfig>,
    transport: Arc<T>,
    leaderboard: Arc<Leaderboard>,
    timers: TimerCoordinator,
    sessions: RwLock<HashMap<SessionKey, SessionEntry>>,
}

impl<T: Transport + 'static> SessionStore<T> {
    pub fn new(bank: Arc<QuestionBank>, config: Arc<QuizConfig>, transport: Arc<T>) -> Self {
        Self {
            bank,
            config,
            transport,
            leaderboard: Arc::new(Leaderboard::new()),
            timers: TimerCoordinator::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session for `key` unless one exists. Returns true if created.
    pub async fn begin(&self, key: SessionKey) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&key) {
            tracing::debug!(session = %key, "Session already exists");
            return false;
        }

        let session = Session::new(self.bank.questions_for_session());
        let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        let runtime = SessionRuntime::new(
            SessionContext::new(key, Arc::clone(&self.config)),
            session,
            Arc::clone(&self.transport),
            Arc::clone(&self.leaderboard),
            self.timers.clone(),
            mailbox_rx,
            &mailbox_tx,
            snapshot_tx,
        );
        let task = tokio::spawn(runtime.run());

        sessions.insert(
            key,
            SessionEntry {
                handle: SessionHandle {
                    mailbox: mailbox_tx,
                    snapshot: snapshot_rx,
                },
                task,
            },
        );
        tracing::info!(session = %key, "Created quiz session");
        true
    }

    pub async fn get(&self, key: SessionKey) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(&key)
            .map(|entry| entry.handle.clone())
    }

    /// Stop and forget one session. Returns false if there was none.
    pub async fn stop(&self, key: SessionKey) -> bool {
        let entry = self.sessions.write().await.remove(&key);
        match entry {
            Some(entry) => {
                entry.shutdown(key, StopReason::User).await;
                true
            }
            None => false,
        }
    }

    /// Silently stop every session in a chat and clear its top score
    pub async fn reset_chat(&self, chat_id: ChatId) -> ResetSummary {
        let drained: Vec<(SessionKey, SessionEntry)> = {
            let mut sessions = self.sessions.write().await;
            let keys: Vec<SessionKey> = sessions
                .keys()
                .filter(|key| key.chat_id == chat_id)
                .copied()
                .collect();
            keys.into_iter()
                .filter_map(|key| sessions.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        let count = drained.len();
        futures::future::join_all(
            drained
                .into_iter()
                .map(|(key, entry)| entry.shutdown(key, StopReason::Reset)),
        )
        .await;

        // Cleared after the actors exit so no late offer can repopulate it
        let top_score = self.leaderboard.clear(chat_id);
        tracing::info!(
            chat_id = %chat_id,
            sessions = count,
            live_timers = self.timers.live_in_chat(chat_id),
            "Reset chat"
        );
        ResetSummary {
            sessions: count,
            top_score,
        }
    }

    /// Score view of every session in a chat, ordered by user
    pub async fn snapshots(&self, chat_id: ChatId) -> Vec<(UserId, SessionSnapshot)> {
        let mut rows: Vec<(UserId, SessionSnapshot)> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.chat_id == chat_id)
            .map(|(key, entry)| (key.user_id, entry.handle.snapshot()))
            .collect();
        rows.sort_by_key(|(user_id, _)| *user_id);
        rows
    }

    /// Stop every session; used on process shutdown
    pub async fn shutdown_all(&self) {
        let drained: Vec<(SessionKey, SessionEntry)> =
            self.sessions.write().await.drain().collect();
        let count = drained.len();
        futures::future::join_all(
            drained
                .into_iter()
                .map(|(key, entry)| entry.shutdown(key, StopReason::Shutdown)),
        )
        .await;
        tracing::info!(
            sessions = count,
            live_timers = self.timers.total_live(),
            stats = ?self.timers.stats(),
            "Stopped all sessions"
        );
    }

    #[allow(dead_code)] // Used by tests
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    #[allow(dead_code)] // Used by tests
    pub fn timers(&self) -> &TimerCoordinator {
        &self.timers
    }
}

//! Timer coordination for session actors
//!
//! Each armed timer is a background task racing a sleep against a
//! `CancellationToken`. A timer is *settled* exactly once, either by firing or
//! by being cancelled; only the settling path that wins may deliver its event.
//! Cancelling never waits on the task, so a firing that is already queued can
//! still reach the session. The session discards it via the generation stamp.

use super::executor::Envelope;
use crate::state_machine::{ChatId, Event, SessionKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Recurring score decay while a question is outstanding
    Decay,
    /// One-shot forfeit of the current question
    Timeout,
}

impl TimerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TimerKind::Decay => "decay",
            TimerKind::Timeout => "timeout",
        }
    }
}

/// Lifetime counters across all sessions
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerStats {
    pub armed: u64,
    pub fired: u64,
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct Ledger {
    live: Mutex<HashMap<(SessionKey, TimerKind), usize>>,
    armed: AtomicU64,
    fired: AtomicU64,
    cancelled: AtomicU64,
}

impl Ledger {
    fn live(&self) -> std::sync::MutexGuard<'_, HashMap<(SessionKey, TimerKind), usize>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true for the single caller that settles `flag`
    fn settle(&self, flag: &AtomicBool, key: SessionKey, kind: TimerKind) -> bool {
        if flag.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut live = self.live();
        if let Some(count) = live.get_mut(&(key, kind)) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                live.remove(&(key, kind));
            }
        }
        true
    }
}

/// Schedules timer events into session mailboxes and audits what is outstanding
#[derive(Debug, Clone, Default)]
pub struct TimerCoordinator {
    ledger: Arc<Ledger>,
}

impl TimerCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to `mailbox` after `after`, unless cancelled first
    pub fn arm(
        &self,
        key: SessionKey,
        kind: TimerKind,
        after: Duration,
        mailbox: mpsc::Sender<Envelope>,
        event: Event,
    ) -> TimerHandle {
        let token = CancellationToken::new();
        let settled = Arc::new(AtomicBool::new(false));

        *self.ledger.live().entry((key, kind)).or_insert(0) += 1;
        self.ledger.armed.fetch_add(1, Ordering::Relaxed);

        let ledger = Arc::clone(&self.ledger);
        let task_token = token.clone();
        let task_settled = Arc::clone(&settled);
        tokio::spawn(async move {
            tokio::select! {
                biased;

                () = task_token.cancelled() => {}

                () = tokio::time::sleep(after) => {
                    if ledger.settle(&task_settled, key, kind) {
                        ledger.fired.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(session = %key, timer = kind.as_str(), "Timer fired");
                        // Mailbox closes when the session is gone; nothing to do then
                        let _ = mailbox.send(Envelope::new(event)).await;
                    }
                }
            }
        });

        TimerHandle {
            key,
            kind,
            token,
            settled,
            ledger: Arc::clone(&self.ledger),
        }
    }

    /// Outstanding timers of one kind for one session
    #[allow(dead_code)] // Used by tests
    pub fn live(&self, key: SessionKey, kind: TimerKind) -> usize {
        self.ledger.live().get(&(key, kind)).copied().unwrap_or(0)
    }

    /// Outstanding timers of any kind for every session in a chat
    pub fn live_in_chat(&self, chat_id: ChatId) -> usize {
        self.ledger
            .live()
            .iter()
            .filter(|((key, _), _)| key.chat_id == chat_id)
            .map(|(_, count)| count)
            .sum()
    }

    pub fn total_live(&self) -> usize {
        self.ledger.live().values().sum()
    }

    pub fn stats(&self) -> TimerStats {
        TimerStats {
            armed: self.ledger.armed.load(Ordering::Relaxed),
            fired: self.ledger.fired.load(Ordering::Relaxed),
            cancelled: self.ledger.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// An armed timer. Cancelled on drop.
#[derive(Debug)]
pub struct TimerHandle {
    key: SessionKey,
    kind: TimerKind,
    token: CancellationToken,
    settled: Arc<AtomicBool>,
    ledger: Arc<Ledger>,
}

impl TimerHandle {
    /// Safe on handles that already fired or were already cancelled
    pub fn cancel(&self) {
        self.token.cancel();
        if self.ledger.settle(&self.settled, self.key, self.kind) {
            self.ledger.cancelled.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[allow(dead_code)] // Used by tests
    pub fn is_live(&self) -> bool {
        !self.settled.load(Ordering::Acquire)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The two timer slots a session owns; arming a slot cancels its previous occupant
#[derive(Debug, Default)]
pub struct SessionTimers {
    timeout: Option<TimerHandle>,
    decay: Option<TimerHandle>,
}

impl SessionTimers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<TimerHandle> {
        match kind {
            TimerKind::Timeout => &mut self.timeout,
            TimerKind::Decay => &mut self.decay,
        }
    }

    pub fn replace(&mut self, handle: TimerHandle) {
        let slot = self.slot(handle.kind);
        if let Some(old) = slot.take() {
            old.cancel();
        }
        *slot = Some(handle);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(old) = self.slot(kind).take() {
            old.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel(TimerKind::Timeout);
        self.cancel(TimerKind::Decay);
    }

    #[allow(dead_code)] // Used by tests to inspect slot state
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Timeout => self.timeout.as_ref().is_some_and(TimerHandle::is_live),
            TimerKind::Decay => self.decay.as_ref().is_some_and(TimerHandle::is_live),
        }
    }
}

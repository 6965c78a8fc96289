//! Session runtime executor
//!
//! One actor task per (chat, user). Commands, answers and timer firings all
//! arrive through the same mailbox, so every mutation of a session is
//! serialized without any lock held across transport I/O.

use super::leaderboard::Leaderboard;
use super::timer::{SessionTimers, TimerCoordinator, TimerKind};
use super::traits::Transport;
use crate::state_machine::{
    transition, Effect, Event, Session, SessionContext, SessionSnapshot, TransitionError,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// A queued event, optionally acknowledged once it and everything it chained are processed
#[derive(Debug)]
pub struct Envelope {
    pub event: Event,
    ack: Option<oneshot::Sender<Result<(), TransitionError>>>,
}

impl Envelope {
    pub fn new(event: Event) -> Self {
        Self { event, ack: None }
    }

    pub fn with_ack(event: Event) -> (Self, oneshot::Receiver<Result<(), TransitionError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                event,
                ack: Some(tx),
            },
            rx,
        )
    }
}

/// Actor owning one session, its two timers and its question message
pub struct SessionRuntime<T: Transport + 'static> {
    context: SessionContext,
    session: Session,
    transport: Arc<T>,
    leaderboard: Arc<Leaderboard>,
    timers: TimerCoordinator,
    slots: SessionTimers,
    mailbox_rx: mpsc::Receiver<Envelope>,
    /// Weak so that an abandoned session's mailbox can close
    mailbox_tx: mpsc::WeakSender<Envelope>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    finished: bool,
}

impl<T: Transport + 'static> SessionRuntime<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        session: Session,
        transport: Arc<T>,
        leaderboard: Arc<Leaderboard>,
        timers: TimerCoordinator,
        mailbox_rx: mpsc::Receiver<Envelope>,
        mailbox_tx: &mpsc::Sender<Envelope>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        Self {
            context,
            session,
            transport,
            leaderboard,
            timers,
            slots: SessionTimers::default(),
            mailbox_rx,
            mailbox_tx: mailbox_tx.downgrade(),
            snapshot_tx,
            finished: false,
        }
    }

    pub async fn run(mut self) {
        let key = self.context.key;
        tracing::info!(session = %key, questions = self.session.total(), "Starting session runtime");

        while !self.finished {
            let Some(Envelope { event, ack }) = self.mailbox_rx.recv().await else {
                break;
            };

            let result = self.process_event(event).await;
            if let Err(e) = &result {
                tracing::warn!(session = %key, error = %e, "Session rejected event");
            }
            if let Some(ack) = ack {
                let _ = ack.send(result);
            }
        }

        self.slots.cancel_all();
        tracing::info!(
            session = %key,
            score = self.session.score,
            phase = ?self.session.phase,
            "Session runtime stopped"
        );
    }

    async fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        // Effects may feed events back (question delivery); drain them here
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let kind = current_event.kind();

            // Pure state transition
            let result = transition(&self.session, &self.context, current_event)?;
            if result.effects.is_empty() {
                tracing::debug!(session = %self.context.key, event = kind, "Discarded stale event");
            }
            self.session = result.new_state;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        let key = self.context.key;
        match effect {
            Effect::Reply { text } => {
                if let Err(e) = self.transport.send_message(key.chat_id, &text).await {
                    tracing::warn!(session = %key, error = %e, "Failed to send reply");
                }
                None
            }

            Effect::ShowQuestion { stamp, text } => {
                let message = match self.transport.send_message(key.chat_id, &text).await {
                    Ok(message) => Some(message),
                    Err(e) => {
                        // The question still counts as presented; timers run regardless
                        tracing::warn!(session = %key, index = stamp.index, error = %e, "Failed to send question");
                        None
                    }
                };
                Some(Event::QuestionShown { stamp, message })
            }

            Effect::DeleteMessage { message } => {
                if let Err(e) = self.transport.delete_message(key.chat_id, message).await {
                    tracing::warn!(session = %key, message = %message, error = %e, "Failed to delete message");
                }
                None
            }

            Effect::ArmTimeout { stamp, after } => {
                self.arm(TimerKind::Timeout, after, Event::QuestionTimeout { stamp });
                None
            }

            Effect::ArmDecay { stamp, after } => {
                self.arm(TimerKind::Decay, after, Event::DecayTick { stamp });
                None
            }

            Effect::CancelTimeout => {
                self.slots.cancel(TimerKind::Timeout);
                None
            }

            Effect::CancelDecay => {
                self.slots.cancel(TimerKind::Decay);
                None
            }

            Effect::OfferTopScore { score } => {
                if self.leaderboard.offer(key.chat_id, key.user_id, score) {
                    tracing::info!(chat_id = %key.chat_id, user_id = %key.user_id, score, "New chat top score");
                }
                None
            }

            Effect::PublishSnapshot => {
                self.snapshot_tx.send_replace(self.session.snapshot());
                None
            }

            Effect::Shutdown => {
                self.slots.cancel_all();
                self.finished = true;
                None
            }
        }
    }

    fn arm(&mut self, kind: TimerKind, after: std::time::Duration, event: Event) {
        let Some(mailbox) = self.mailbox_tx.upgrade() else {
            tracing::debug!(session = %self.context.key, timer = kind.as_str(), "Mailbox closed, not arming timer");
            return;
        };
        let handle = self
            .timers
            .arm(self.context.key, kind, after, mailbox, event);
        self.slots.replace(handle);
    }
}

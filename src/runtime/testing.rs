//! Mock implementations for testing
//!
//! These mocks enable integration testing of session actors without a real
//! chat platform.

use super::traits::*;
use crate::state_machine::{ChatId, MessageRef, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

// ============================================================================
// Recording Transport
// ============================================================================

/// Everything a session asked the transport to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Sent {
        chat_id: ChatId,
        message: MessageRef,
        text: String,
    },
    Deleted {
        chat_id: ChatId,
        message: MessageRef,
    },
}

/// Transport that records calls and can be told to fail
#[allow(dead_code)]
pub struct RecordingTransport {
    next_ref: AtomicI64,
    log: Mutex<Vec<Outbound>>,
    names: Mutex<HashMap<(ChatId, UserId), String>>,
    fail_sends: AtomicBool,
    fail_deletes: AtomicBool,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            next_ref: AtomicI64::new(1),
            log: Mutex::new(Vec::new()),
            names: Mutex::new(HashMap::new()),
            fail_sends: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn with_name(self, chat_id: ChatId, user_id: UserId, name: impl Into<String>) -> Self {
        self.names
            .lock()
            .unwrap()
            .insert((chat_id, user_id), name.into());
        self
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.log.lock().unwrap().clone()
    }

    /// Texts sent to one chat, oldest first
    pub fn sent_texts(&self, chat_id: ChatId) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Sent {
                    chat_id: c, text, ..
                } if c == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self, chat_id: ChatId) -> Vec<MessageRef> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Deleted {
                    chat_id: c,
                    message,
                } if c == chat_id => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Ref and text of the last message sent to a chat whose text starts with `prefix`
    pub fn last_sent_with(&self, chat_id: ChatId, prefix: &str) -> Option<(MessageRef, String)> {
        self.outbound().into_iter().rev().find_map(|o| match o {
            Outbound::Sent {
                chat_id: c,
                message,
                text,
            } if c == chat_id && text.starts_with(prefix) => Some((message, text)),
            _ => None,
        })
    }

    pub fn count_sent_with(&self, chat_id: ChatId, prefix: &str) -> usize {
        self.sent_texts(chat_id)
            .iter()
            .filter(|t| t.starts_with(prefix))
            .count()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("injected failure".to_string()));
        }
        let message = MessageRef(self.next_ref.fetch_add(1, Ordering::SeqCst));
        self.log.lock().unwrap().push(Outbound::Sent {
            chat_id,
            message,
            text: text.to_string(),
        });
        Ok(message)
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(TransportError::Delete {
                message,
                reason: "injected failure".to_string(),
            });
        }
        self.log
            .lock()
            .unwrap()
            .push(Outbound::Deleted { chat_id, message });
        Ok(())
    }

    async fn display_name(&self, chat_id: ChatId, user_id: UserId) -> Result<String, TransportError> {
        self.names
            .lock()
            .unwrap()
            .get(&(chat_id, user_id))
            .cloned()
            .ok_or(TransportError::UnknownUser(user_id))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{QuestionBank, QuestionRecord};
    use crate::config::QuizConfig;
    use crate::runtime::{SessionError, SessionStore, TimerKind};
    use crate::state_machine::{Event, SessionKey, SessionPhase, TimerStamp, TransitionError};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    const QUESTION: &str = "Question ";

    /// Questions whose answers can be derived from the prompt text
    fn numbered_bank(n: usize) -> Arc<QuestionBank> {
        Arc::new(
            QuestionBank::new(
                (1..=n)
                    .map(|i| {
                        QuestionRecord::new(
                            format!("Question {i}"),
                            format!("answer {i}"),
                            format!("clue {i}"),
                        )
                    })
                    .collect(),
            )
            .unwrap(),
        )
    }

    fn answer_to(prompt: &str) -> String {
        prompt.replace("Question", "answer")
    }

    fn test_config() -> QuizConfig {
        QuizConfig {
            decay_interval: Duration::from_secs(4),
            ..QuizConfig::default()
        }
    }

    fn harness(n: usize) -> (SessionStore<RecordingTransport>, Arc<RecordingTransport>) {
        harness_with(n, test_config())
    }

    fn harness_with(
        n: usize,
        config: QuizConfig,
    ) -> (SessionStore<RecordingTransport>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let store = SessionStore::new(numbered_bank(n), Arc::new(config), Arc::clone(&transport));
        (store, transport)
    }

    fn key(chat: i64, user: i64) -> SessionKey {
        SessionKey::new(ChatId(chat), UserId(user))
    }

    /// Let spawned timer and actor tasks run to quiescence
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn answer_current(
        store: &SessionStore<RecordingTransport>,
        transport: &RecordingTransport,
        key: SessionKey,
        bonus: u32,
    ) {
        let (_, prompt) = transport.last_sent_with(key.chat_id, QUESTION).unwrap();
        let handle = store.get(key).await.unwrap();
        handle
            .deliver(Event::Answer {
                text: answer_to(&prompt).to_uppercase(),
                bonus,
            })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_question_walkthrough() {
        let (store, transport) = harness(3);
        let k = key(-100, 7);
        assert!(store.begin(k).await);
        let handle = store.get(k).await.unwrap();
        handle.deliver(Event::Present).await.unwrap();

        // Q1 answered straight away
        answer_current(&store, &transport, k, 10).await;
        assert_eq!(handle.snapshot().score, 10);
        assert_eq!(handle.snapshot().current_index, 1);

        // Q2 is left alone: seven decay ticks before the timeout
        tokio::time::sleep(Duration::from_secs(29)).await;
        settle().await;
        assert_eq!(handle.snapshot().score, 3);
        assert_eq!(handle.snapshot().current_index, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(handle.snapshot().current_index, 2);
        assert_eq!(
            transport.count_sent_with(ChatId(-100), "Time's up! The correct answer was"),
            1
        );

        // Q3: two misses, then correct
        for _ in 0..2 {
            handle
                .deliver(Event::Answer {
                    text: "nope".to_string(),
                    bonus: 5,
                })
                .await
                .unwrap();
        }
        assert_eq!(handle.snapshot().incorrect_streak, 2);
        assert_eq!(transport.count_sent_with(ChatId(-100), "Incorrect. Here's a clue"), 2);
        answer_current(&store, &transport, k, 4).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.score, 7);
        assert_eq!(snapshot.current_index, 3);
        assert_eq!(snapshot.phase, SessionPhase::Completed);
        assert_eq!(
            transport.sent_texts(ChatId(-100)).last().map(String::as_str),
            Some("Quiz completed! Your final score is 7.")
        );
        assert_eq!(store.leaderboard().top(ChatId(-100)).map(|t| t.user_id), Some(UserId(7)));
        assert_eq!(store.timers().live_in_chat(ChatId(-100)), 0);

        // Nothing moves once completed
        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(handle.snapshot(), snapshot);

        // Every displayed question was cleaned up
        assert_eq!(transport.deleted(ChatId(-100)).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timeout_is_discarded() {
        let (store, transport) = harness(3);
        let k = key(1, 1);
        store.begin(k).await;
        let handle = store.get(k).await.unwrap();

        handle.deliver(Event::Present).await.unwrap();
        let (first, _) = transport.last_sent_with(ChatId(1), QUESTION).unwrap();
        handle.deliver(Event::Present).await.unwrap();

        // Re-presenting replaced the displayed question and both timers
        assert_eq!(transport.deleted(ChatId(1)), vec![first]);
        assert_eq!(store.timers().live(k, TimerKind::Timeout), 1);
        assert_eq!(store.timers().live(k, TimerKind::Decay), 1);

        // A firing from the first presentation arrives late
        let stale = TimerStamp {
            index: 0,
            generation: 1,
        };
        handle
            .deliver(Event::QuestionTimeout { stamp: stale })
            .await
            .unwrap();
        handle.deliver(Event::DecayTick { stamp: stale }).await.unwrap();

        assert_eq!(handle.snapshot().current_index, 0);
        assert_eq!(transport.count_sent_with(ChatId(1), "Time's up!"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_leaves_no_timers() {
        let (store, transport) = harness(3);
        for k in [key(1, 1), key(1, 2), key(2, 1)] {
            store.begin(k).await;
            store.get(k).await.unwrap().deliver(Event::Present).await.unwrap();
        }
        answer_current(&store, &transport, key(1, 2), 6).await;
        assert_eq!(store.timers().live_in_chat(ChatId(1)), 4);

        let summary = store.reset_chat(ChatId(1)).await;
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.top_score.map(|t| t.score), Some(6));
        assert!(summary.had_data());

        assert_eq!(store.timers().live_in_chat(ChatId(1)), 0);
        assert_eq!(store.timers().live_in_chat(ChatId(2)), 2);
        assert!(store.get(key(1, 1)).await.is_none());
        assert!(store.leaderboard().top(ChatId(1)).is_none());

        let sent_before = transport.sent_texts(ChatId(1)).len();
        tokio::time::sleep(Duration::from_secs(90)).await;
        settle().await;
        // Reset is silent and nothing in the chat fires afterwards
        assert_eq!(transport.sent_texts(ChatId(1)).len(), sent_before);
        assert!(transport.count_sent_with(ChatId(2), "Time's up!") > 0);

        let again = store.reset_chat(ChatId(1)).await;
        assert!(!again.had_data());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_begin_is_fresh() {
        let (store, transport) = harness(3);
        let k = key(5, 5);
        store.begin(k).await;
        let handle = store.get(k).await.unwrap();
        handle.deliver(Event::Present).await.unwrap();
        answer_current(&store, &transport, k, 9).await;
        assert!(!store.begin(k).await, "begin must not reset a live session");
        assert_eq!(handle.snapshot().score, 9);

        assert!(store.stop(k).await);
        assert_eq!(
            transport.sent_texts(ChatId(5)).last().map(String::as_str),
            Some("The quiz has been stopped. Type /start to begin a new quiz session.")
        );
        assert_eq!(store.timers().live_in_chat(ChatId(5)), 0);
        assert!(!store.stop(k).await);

        // The old handle is dead
        assert_eq!(
            handle.deliver(Event::Present).await,
            Err(SessionError::Closed)
        );

        assert!(store.begin(k).await);
        let fresh = store.get(k).await.unwrap().snapshot();
        assert_eq!(fresh.score, 0);
        assert_eq!(fresh.current_index, 0);
        assert_eq!(fresh.phase, SessionPhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_begin_reshuffles_questions() {
        let (store, transport) = harness(8);
        let k = key(5, 6);
        let mut openers = HashSet::new();

        for _ in 0..12 {
            assert!(store.begin(k).await);
            store.get(k).await.unwrap().deliver(Event::Present).await.unwrap();
            let (_, prompt) = transport.last_sent_with(ChatId(5), QUESTION).unwrap();
            openers.insert(prompt);
            assert!(store.stop(k).await);
        }

        // Twelve identical openers out of eight questions would mean no reshuffle
        assert!(openers.len() > 1, "every session opened with {openers:?}");
        assert_eq!(store.timers().live_in_chat(ChatId(5)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_top_scores_keep_maximum() {
        // Wide enough that every user's bonus survives the clamp
        let (store, transport) = harness_with(
            2,
            QuizConfig {
                max_points: 100,
                ..test_config()
            },
        );
        let store = Arc::new(store);
        let keys: Vec<SessionKey> = (1..=20).map(|u| key(3, u)).collect();

        for k in &keys {
            store.begin(*k).await;
            store.get(*k).await.unwrap().deliver(Event::Present).await.unwrap();
        }

        // Either shuffle order ends with both questions answered correctly exactly once
        let answers = keys.iter().map(|k| {
            let store = Arc::clone(&store);
            let k = *k;
            async move {
                let handle = store.get(k).await.unwrap();
                let bonus = u32::try_from(k.user_id.0).unwrap();
                for text in ["answer 1", "answer 2", "answer 1"] {
                    handle
                        .deliver(Event::Answer {
                            text: text.to_string(),
                            bonus,
                        })
                        .await
                        .unwrap();
                }
            }
        });
        futures::future::join_all(answers).await;

        let top = store.leaderboard().top(ChatId(3)).unwrap();
        assert_eq!(top.user_id, UserId(20));
        assert_eq!(top.score, 40);
        let best = store
            .snapshots(ChatId(3))
            .await
            .iter()
            .map(|(_, s)| s.score)
            .max()
            .unwrap();
        assert_eq!(top.score, best);
        assert!(transport.sent_texts(ChatId(3)).len() > 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_do_not_stall_session() {
        let (store, transport) = harness(3);
        let k = key(8, 1);
        store.begin(k).await;
        let handle = store.get(k).await.unwrap();

        transport.set_fail_sends(true);
        handle.deliver(Event::Present).await.unwrap();
        assert_eq!(handle.snapshot().question_message, None);
        assert_eq!(store.timers().live(k, TimerKind::Timeout), 1);

        // Undelivered question still times out and advances
        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(handle.snapshot().current_index, 1);

        transport.set_fail_sends(false);
        handle.deliver(Event::Present).await.unwrap();
        assert!(handle.snapshot().question_message.is_some());

        transport.set_fail_deletes(true);
        answer_current(&store, &transport, k, 3).await;
        assert_eq!(handle.snapshot().current_index, 2);
        assert_eq!(handle.snapshot().score, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_is_local_to_session() {
        let (store, transport) = harness(1);
        let finisher = key(4, 1);
        let idler = key(4, 2);
        for k in [finisher, idler] {
            store.begin(k).await;
            store.get(k).await.unwrap().deliver(Event::Present).await.unwrap();
        }

        answer_current(&store, &transport, finisher, 2).await;
        let done = store.get(finisher).await.unwrap();
        assert_eq!(done.snapshot().phase, SessionPhase::Completed);

        // Completed sessions answer politely instead of going away
        done.deliver(Event::Present).await.unwrap();
        assert_eq!(
            transport.sent_texts(ChatId(4)).last().map(String::as_str),
            Some("Quiz completed! Your final score is 2.")
        );
        done.deliver(Event::Answer {
            text: "answer 1".to_string(),
            bonus: 5,
        })
        .await
        .unwrap();
        assert_eq!(
            transport.sent_texts(ChatId(4)).last().map(String::as_str),
            Some("The quiz is already finished.")
        );

        // The other session keeps its clock
        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        let other = store.get(idler).await.unwrap().snapshot();
        assert_eq!(other.phase, SessionPhase::Completed);
        assert_eq!(store.session_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ledger_balances() {
        let (store, transport) = harness(5);
        let k = key(6, 1);
        store.begin(k).await;
        let handle = store.get(k).await.unwrap();

        for _ in 0..10 {
            handle.deliver(Event::Present).await.unwrap();
            assert_eq!(store.timers().live(k, TimerKind::Timeout), 1);
            assert_eq!(store.timers().live(k, TimerKind::Decay), 1);
        }
        tokio::time::sleep(Duration::from_secs(9)).await;
        settle().await;
        answer_current(&store, &transport, k, 1).await;

        let stats = store.timers().stats();
        let live = u64::try_from(store.timers().total_live()).unwrap();
        assert_eq!(stats.armed, stats.fired + stats.cancelled + live);
        assert_eq!(live, 2);

        store.shutdown_all().await;
        assert_eq!(store.timers().total_live(), 0);
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_session_rejects_events() {
        let (store, _transport) = harness(2);
        let k = key(9, 9);
        store.begin(k).await;
        let handle = store.get(k).await.unwrap();

        // Two stops raced from two callers: the second lands on a stopped session or a closed mailbox
        handle
            .post(Event::Stop {
                reason: crate::state_machine::StopReason::Reset,
            })
            .await
            .unwrap();
        let second = handle
            .deliver(Event::Stop {
                reason: crate::state_machine::StopReason::Reset,
            })
            .await;
        assert!(matches!(
            second,
            Err(SessionError::Closed | SessionError::Rejected(TransitionError::SessionStopped))
        ));
    }
}

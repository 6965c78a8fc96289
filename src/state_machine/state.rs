//! Quiz session state types

use crate::bank::QuestionRecord;
use crate::config::QuizConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Identifiers
// ============================================================================

/// Chat room identifier assigned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// User identifier assigned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Opaque handle to a message the transport delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A session is keyed by the (chat, user) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl SessionKey {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self { chat_id, user_id }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.user_id)
    }
}

/// Identifies the question presentation a timer was armed for.
///
/// `generation` is bumped on every presentation, so a firing whose stamp no
/// longer matches the session was superseded and must be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimerStamp {
    pub index: usize,
    pub generation: u64,
}

// ============================================================================
// Session Context - immutable per-session environment
// ============================================================================

/// Immutable context shared by every transition of one session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub key: SessionKey,
    pub config: Arc<QuizConfig>,
}

impl SessionContext {
    pub fn new(key: SessionKey, config: Arc<QuizConfig>) -> Self {
        Self { key, config }
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Questions remain
    #[default]
    Active,
    /// Every question has been answered, revealed or timed out
    Completed,
    /// Ended by `/stop` or an administrative reset
    Stopped,
}

/// Progress of one user through their shuffled questions
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub score: u32,
    /// Private permutation of the bank, fixed at creation
    pub questions: Arc<[Arc<QuestionRecord>]>,
    pub current_index: usize,
    pub incorrect_streak: u32,
    /// Question message currently on screen, deleted when the question moves on
    pub question_message: Option<MessageRef>,
    pub generation: u64,
    pub phase: SessionPhase,
}

impl Session {
    pub fn new(questions: Vec<Arc<QuestionRecord>>) -> Self {
        let phase = if questions.is_empty() {
            SessionPhase::Completed
        } else {
            SessionPhase::Active
        };
        Self {
            score: 0,
            questions: questions.into(),
            current_index: 0,
            incorrect_streak: 0,
            question_message: None,
            generation: 0,
            phase,
        }
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<&Arc<QuestionRecord>> {
        self.questions.get(self.current_index)
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Stamp for timers armed at the current generation
    pub fn stamp(&self) -> TimerStamp {
        TimerStamp {
            index: self.current_index,
            generation: self.generation,
        }
    }

    /// Whether a timer carrying `stamp` still belongs to the live question
    pub fn is_current(&self, stamp: TimerStamp) -> bool {
        self.is_active() && stamp == self.stamp()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            score: self.score,
            current_index: self.current_index,
            total: self.total(),
            incorrect_streak: self.incorrect_streak,
            phase: self.phase,
            question_message: self.question_message,
        }
    }
}

/// Read-only view of a session published after every mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub score: u32,
    pub current_index: usize,
    pub total: usize,
    pub incorrect_streak: u32,
    pub phase: SessionPhase,
    pub question_message: Option<MessageRef>,
}

//! Events that can occur in a quiz session

use super::state::{MessageRef, TimerStamp};

/// Why a session is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user sent `/stop`
    User,
    /// An admin reset the chat
    Reset,
    /// The process is shutting down
    Shutdown,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User events
    /// `/quiz`: show the current question and (re)arm both timers
    Present,
    /// Free text treated as an answer; `bonus` is pre-drawn so transitions stay pure
    Answer { text: String, bonus: u32 },
    Stop { reason: StopReason },

    // Transport feedback
    /// The question sent for `stamp` was delivered (or not, if `message` is `None`)
    QuestionShown {
        stamp: TimerStamp,
        message: Option<MessageRef>,
    },

    // Timer events
    QuestionTimeout { stamp: TimerStamp },
    DecayTick { stamp: TimerStamp },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Present => "present",
            Event::Answer { .. } => "answer",
            Event::Stop { .. } => "stop",
            Event::QuestionShown { .. } => "question_shown",
            Event::QuestionTimeout { .. } => "question_timeout",
            Event::DecayTick { .. } => "decay_tick",
        }
    }
}

//! Effects produced by state transitions

use super::state::{MessageRef, TimerStamp};
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a plain reply to the chat
    Reply { text: String },

    /// Send a question; the executor feeds back `Event::QuestionShown`
    ShowQuestion { stamp: TimerStamp, text: String },

    /// Delete a previously sent message (tolerates "already gone")
    DeleteMessage { message: MessageRef },

    /// Replace the question-timeout timer
    ArmTimeout { stamp: TimerStamp, after: Duration },

    /// Replace the decay timer
    ArmDecay { stamp: TimerStamp, after: Duration },

    CancelTimeout,

    CancelDecay,

    /// Offer the session's score to the chat leaderboard
    OfferTopScore { score: u32 },

    /// Publish the new state to observers
    PublishSnapshot,

    /// Stop the session actor after the remaining effects run
    Shutdown,
}

impl Effect {
    pub fn reply(text: impl Into<String>) -> Self {
        Effect::Reply { text: text.into() }
    }

    #[allow(dead_code)] // Used by property tests
    pub fn is_timer_arm(&self) -> bool {
        matches!(self, Effect::ArmTimeout { .. } | Effect::ArmDecay { .. })
    }
}

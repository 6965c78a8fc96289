//! Per-chat top score slots

use crate::state_machine::{ChatId, UserId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Best score recorded in a chat and who holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopScore {
    pub user_id: UserId,
    pub score: u32,
}

/// One slot per chat. Updates are compare-and-set under the map lock, so
/// concurrent offers never lose the true maximum.
#[derive(Debug, Default)]
pub struct Leaderboard {
    slots: Mutex<HashMap<ChatId, TopScore>>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<ChatId, TopScore>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `score` if it strictly beats the chat's current best.
    /// Ties keep the earlier holder. An empty slot counts as zero.
    pub fn offer(&self, chat_id: ChatId, user_id: UserId, score: u32) -> bool {
        let mut slots = self.slots();
        let best = slots.get(&chat_id).map_or(0, |top| top.score);
        if score <= best {
            return false;
        }
        slots.insert(chat_id, TopScore { user_id, score });
        true
    }

    pub fn top(&self, chat_id: ChatId) -> Option<TopScore> {
        self.slots().get(&chat_id).copied()
    }

    pub fn clear(&self, chat_id: ChatId) -> Option<TopScore> {
        self.slots().remove(&chat_id)
    }
}

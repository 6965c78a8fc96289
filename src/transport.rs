//! In-process chat transport
//!
//! Keeps a per-chat outbox of everything the bot said and fans outbound
//! activity out to HTTP subscribers. Stands in for a real chat platform.

use crate::runtime::{Transport, TransportError};
use crate::state_machine::{ChatId, MessageRef, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 256;
const OUTBOX_LIMIT: usize = 500;

/// A message the bot posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub message_ref: MessageRef,
    pub chat_id: ChatId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Outbound activity pushed to stream subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Message(OutboundMessage),
    Deleted {
        chat_id: ChatId,
        message_ref: MessageRef,
    },
}

impl OutboundEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            OutboundEvent::Message(message) => message.chat_id,
            OutboundEvent::Deleted { chat_id, .. } => *chat_id,
        }
    }
}

/// Visible messages per chat, oldest first; deleted ones are dropped
#[derive(Debug, Default)]
struct Rooms {
    outboxes: HashMap<ChatId, VecDeque<OutboundMessage>>,
    names: HashMap<(ChatId, UserId), String>,
}

pub struct OutboxTransport {
    next_ref: AtomicI64,
    outbox_limit: usize,
    rooms: Mutex<Rooms>,
    feed: broadcast::Sender<OutboundEvent>,
}

impl Default for OutboxTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboxTransport {
    pub fn new() -> Self {
        Self::with_outbox_limit(OUTBOX_LIMIT)
    }

    /// Keep at most `limit` visible messages per chat, evicting the oldest
    pub fn with_outbox_limit(limit: usize) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            next_ref: AtomicI64::new(1),
            outbox_limit: limit.max(1),
            rooms: Mutex::new(Rooms::default()),
            feed,
        }
    }

    fn rooms(&self) -> MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember how a user wants to be called in a chat
    pub fn register_name(&self, chat_id: ChatId, user_id: UserId, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.rooms()
            .names
            .insert((chat_id, user_id), name.to_string());
    }

    /// Messages still visible in a chat, oldest first
    pub fn messages(&self, chat_id: ChatId) -> Vec<OutboundMessage> {
        self.rooms()
            .outboxes
            .get(&chat_id)
            .map(|outbox| outbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.feed.subscribe()
    }

    fn publish(&self, event: OutboundEvent) {
        // No subscribers is fine
        let _ = self.feed.send(event);
    }
}

#[async_trait]
impl Transport for OutboxTransport {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, TransportError> {
        let message = {
            let mut rooms = self.rooms();
            // Allocated under the lock so each outbox stays sorted by ref
            let message = OutboundMessage {
                message_ref: MessageRef(self.next_ref.fetch_add(1, Ordering::Relaxed)),
                chat_id,
                text: text.to_string(),
                sent_at: Utc::now(),
            };
            let outbox = rooms.outboxes.entry(chat_id).or_default();
            outbox.push_back(message.clone());
            while outbox.len() > self.outbox_limit {
                outbox.pop_front();
            }
            message
        };

        tracing::debug!(chat_id = %chat_id, message = %message.message_ref, "Sent message");
        let message_ref = message.message_ref;
        self.publish(OutboundEvent::Message(message));
        Ok(message_ref)
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        let removed = {
            let mut rooms = self.rooms();
            let removed = rooms.outboxes.get_mut(&chat_id).is_some_and(|outbox| {
                outbox
                    .binary_search_by_key(&message, |m| m.message_ref)
                    .ok()
                    .and_then(|position| outbox.remove(position))
                    .is_some()
            });
            if rooms.outboxes.get(&chat_id).is_some_and(VecDeque::is_empty) {
                rooms.outboxes.remove(&chat_id);
            }
            removed
        };

        // Unknown, evicted or already deleted messages are not an error
        if removed {
            self.publish(OutboundEvent::Deleted {
                chat_id,
                message_ref: message,
            });
        } else {
            tracing::debug!(chat_id = %chat_id, message = %message, "Message already gone");
        }
        Ok(())
    }

    async fn display_name(&self, chat_id: ChatId, user_id: UserId) -> Result<String, TransportError> {
        self.rooms()
            .names
            .get(&(chat_id, user_id))
            .cloned()
            .ok_or(TransportError::UnknownUser(user_id))
    }
}

//! Trait abstractions for runtime I/O
//!
//! The chat platform sits behind `Transport` so the executor can be tested
//! with mock implementations.

use crate::state_machine::{ChatId, MessageRef, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failures reported by the chat platform
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to send message: {0}")]
    Send(String),
    #[error("failed to delete message {message}: {reason}")]
    Delete { message: MessageRef, reason: String },
    #[error("unknown user {0}")]
    UnknownUser(UserId),
}

/// Outbound side of the chat platform
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a message to a chat, returning a handle for later deletion
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, TransportError>;

    /// Remove a message. Deleting something already gone must not fail.
    async fn delete_message(&self, chat_id: ChatId, message: MessageRef)
        -> Result<(), TransportError>;

    /// Human-readable name of a chat member
    async fn display_name(&self, chat_id: ChatId, user_id: UserId) -> Result<String, TransportError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, TransportError> {
        (**self).send_message(chat_id, text).await
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        (**self).delete_message(chat_id, message).await
    }

    async fn display_name(&self, chat_id: ChatId, user_id: UserId) -> Result<String, TransportError> {
        (**self).display_name(chat_id, user_id).await
    }
}

//! API request and response types

use crate::state_machine::UserId;
use crate::transport::OutboundMessage;
use serde::{Deserialize, Serialize};

/// Request to run a command on behalf of a user
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Free text from a user, treated as an answer
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub user_id: UserId,
    pub text: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Response for inbound actions
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub ok: bool,
}

/// Visible bot messages in a chat
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<OutboundMessage>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

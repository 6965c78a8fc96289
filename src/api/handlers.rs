//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{AcceptedResponse, CommandRequest, ErrorResponse, MessageRequest, MessagesResponse};
use super::AppState;
use crate::dispatch::QuizError;
use crate::state_machine::{ChatId, UserId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Inbound traffic
        .route("/api/chats/:chat_id/commands/:name", post(run_command))
        .route(
            "/api/chats/:chat_id/messages",
            post(send_message).get(list_messages),
        )
        // SSE streaming
        .route("/api/chats/:chat_id/stream", get(stream_chat))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Inbound
// ============================================================

async fn run_command(
    State(state): State<AppState>,
    Path((chat_id, name)): Path<(ChatId, String)>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<AcceptedResponse>, AppError> {
    remember_name(&state, chat_id, req.user_id, req.display_name.as_deref());
    state
        .dispatcher
        .on_command(&name, chat_id, req.user_id)
        .await?;
    Ok(Json(AcceptedResponse { ok: true }))
}

async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<AcceptedResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }
    remember_name(&state, chat_id, req.user_id, req.display_name.as_deref());
    state
        .dispatcher
        .on_text(&req.text, chat_id, req.user_id)
        .await?;
    Ok(Json(AcceptedResponse { ok: true }))
}

fn remember_name(state: &AppState, chat_id: ChatId, user_id: UserId, name: Option<&str>) {
    if let Some(name) = name {
        state.transport.register_name(chat_id, user_id, name);
    }
}

// ============================================================
// Outbound
// ============================================================

async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: state.transport.messages(chat_id),
    })
}

async fn stream_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> impl IntoResponse {
    // Subscribe before reading the backlog so nothing falls in between
    let broadcast_rx = state.transport.subscribe();
    let backlog = state.transport.messages(chat_id);
    sse_stream(chat_id, backlog, broadcast_rx)
}

async fn get_version() -> &'static str {
    concat!("quizline ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

impl From<QuizError> for AppError {
    /// Missing sessions and permission failures are answered in the chat, so
    /// only unknown commands and transport failures reach HTTP.
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::UnknownCommand(_) => AppError::BadRequest(err.to_string()),
            other => {
                tracing::error!(error = %other, "Failed to handle chat request");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

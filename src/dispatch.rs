//! Inbound command and answer routing
//!
//! Translates chat commands and free text into session store operations and
//! session events. Replies that don't belong to a session (welcome text,
//! leaderboard queries, admin output) are sent from here.

use crate::runtime::{SessionError, SessionStore, Transport, TransportError};
use crate::state_machine::{ChatId, Event, SessionKey, UserId};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

const WELCOME: &str = "Welcome to the quiz bot! Type /quiz to start the quiz.";
const START_FIRST: &str = "Please start by typing /start";
const NOT_IN_SESSION: &str = "You are not currently in a quiz session.";
const NO_PERMISSION: &str = "You do not have permission to use this command.";
const NO_DATA: &str = "No quiz data found for this chat.";

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("no active quiz session")]
    NoActiveSession,
    #[error("user is not allowed to run this command")]
    Unauthorized,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<SessionError> for QuizError {
    fn from(_: SessionError) -> Self {
        // A closed mailbox or stopped session both mean the user has no quiz anymore
        QuizError::NoActiveSession
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Quiz,
    Stop,
    Top,
    ResetScores,
    ReviewScores,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Quiz => "quiz",
            Command::Stop => "stop",
            Command::Top => "top",
            Command::ResetScores => "reset_scores",
            Command::ReviewScores => "review_scores",
        }
    }

    /// Restricted to the admin allow-list
    pub fn is_privileged(self) -> bool {
        matches!(self, Command::ResetScores | Command::ReviewScores)
    }
}

impl FromStr for Command {
    type Err = QuizError;

    /// Accepts `quiz`, `/quiz`, `/Quiz`, `/quiz@SomeBot` and `/quiz now`
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        // Arguments after the command name are ignored
        let trimmed = raw.split_whitespace().next().unwrap_or_default();
        let name = trimmed.strip_prefix('/').unwrap_or(trimmed);
        let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();
        match name.as_str() {
            "start" => Ok(Command::Start),
            "quiz" => Ok(Command::Quiz),
            "stop" => Ok(Command::Stop),
            "top" => Ok(Command::Top),
            "reset_scores" => Ok(Command::ResetScores),
            "review_scores" => Ok(Command::ReviewScores),
            _ => Err(QuizError::UnknownCommand(trimmed.to_string())),
        }
    }
}

/// Routes inbound traffic for every chat
pub struct Dispatcher<T: Transport + 'static> {
    store: Arc<SessionStore<T>>,
    admins: HashSet<UserId>,
}

impl<T: Transport + 'static> Dispatcher<T> {
    pub fn new(store: Arc<SessionStore<T>>, admins: HashSet<UserId>) -> Self {
        Self { store, admins }
    }

    #[allow(dead_code)] // Used by tests
    pub fn store(&self) -> &SessionStore<T> {
        &self.store
    }

    /// Handle a command. User-facing failures are answered in the chat; only
    /// unknown commands and transport errors surface to the caller.
    pub async fn on_command(
        &self,
        name: &str,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), QuizError> {
        let command: Command = name.parse()?;
        tracing::info!(
            chat_id = %chat_id,
            user_id = %user_id,
            command = command.as_str(),
            "Handling command"
        );

        let key = SessionKey::new(chat_id, user_id);
        let outcome = if command.is_privileged() && !self.admins.contains(&user_id) {
            tracing::warn!(chat_id = %chat_id, user_id = %user_id, command = command.as_str(), "Rejected privileged command");
            Err(QuizError::Unauthorized)
        } else {
            match command {
                Command::Start => self.start(key).await,
                Command::Quiz => self.quiz(key).await,
                Command::Stop => self.stop(key).await,
                Command::Top => self.top(chat_id).await,
                Command::ResetScores => self.reset_scores(chat_id).await,
                Command::ReviewScores => self.review_scores(chat_id).await,
            }
        };
        self.settle(chat_id, outcome).await
    }

    /// Handle free text as an answer to the user's current question
    pub async fn on_text(&self, text: &str, chat_id: ChatId, user_id: UserId) -> Result<(), QuizError> {
        let key = SessionKey::new(chat_id, user_id);
        let outcome = match self.store.get(key).await {
            Some(handle) => {
                let bonus = self.store.config().draw_bonus(&mut rand::thread_rng());
                handle
                    .deliver(Event::Answer {
                        text: text.to_string(),
                        bonus,
                    })
                    .await
                    .map_err(QuizError::from)
            }
            None => Err(QuizError::NoActiveSession),
        };
        self.settle(chat_id, outcome).await
    }

    /// Stop every session; called once on process shutdown
    pub async fn shutdown(&self) {
        self.store.shutdown_all().await;
    }

    async fn settle(&self, chat_id: ChatId, outcome: Result<(), QuizError>) -> Result<(), QuizError> {
        match outcome {
            Err(QuizError::NoActiveSession) => self.reply(chat_id, START_FIRST).await,
            Err(QuizError::Unauthorized) => self.reply(chat_id, NO_PERMISSION).await,
            other => other,
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) -> Result<(), QuizError> {
        self.store.transport().send_message(chat_id, text).await?;
        Ok(())
    }

    async fn start(&self, key: SessionKey) -> Result<(), QuizError> {
        self.store.begin(key).await;
        self.reply(key.chat_id, WELCOME).await
    }

    async fn quiz(&self, key: SessionKey) -> Result<(), QuizError> {
        let handle = self.store.get(key).await.ok_or(QuizError::NoActiveSession)?;
        handle.deliver(Event::Present).await?;
        Ok(())
    }

    async fn stop(&self, key: SessionKey) -> Result<(), QuizError> {
        if self.store.stop(key).await {
            Ok(())
        } else {
            self.reply(key.chat_id, NOT_IN_SESSION).await
        }
    }

    async fn top(&self, chat_id: ChatId) -> Result<(), QuizError> {
        let Some(top) = self.store.leaderboard().top(chat_id) else {
            return self.reply(chat_id, "No top user yet in this chat.").await;
        };
        let name = match self
            .store
            .transport()
            .display_name(chat_id, top.user_id)
            .await
        {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(chat_id = %chat_id, user_id = %top.user_id, error = %e, "Falling back to user id");
                format!("User {}", top.user_id)
            }
        };
        self.reply(
            chat_id,
            &format!("The top user is {name} with {} points.", top.score),
        )
        .await
    }

    async fn reset_scores(&self, chat_id: ChatId) -> Result<(), QuizError> {
        let summary = self.store.reset_chat(chat_id).await;
        if summary.had_data() {
            self.reply(chat_id, "Scores have been reset for this chat.").await
        } else {
            self.reply(chat_id, NO_DATA).await
        }
    }

    async fn review_scores(&self, chat_id: ChatId) -> Result<(), QuizError> {
        let rows = self.store.snapshots(chat_id).await;
        if rows.is_empty() {
            return self.reply(chat_id, NO_DATA).await;
        }

        let mut text = String::from("Current scores:");
        for (user_id, snapshot) in rows {
            let _ = write!(text, "\nUser {user_id}: {} points", snapshot.score);
        }
        self.reply(chat_id, &text).await
    }
}

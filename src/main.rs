//! Quizline - timed multi-room trivia
//!
//! Every (chat, user) pair runs its own quiz session with a decaying score
//! and a per-question deadline. A small HTTP surface stands in for the chat
//! platform.

mod api;
mod bank;
mod config;
mod dispatch;
mod runtime;
mod state_machine;
mod transport;

use api::{create_router, AppState};
use bank::QuestionBank;
use config::AppConfig;
use dispatch::Dispatcher;
use runtime::SessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::OutboxTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizline=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        min_points = config.quiz.min_points,
        max_points = config.quiz.max_points,
        decay_interval_secs = config.quiz.decay_interval.as_secs(),
        question_timeout_secs = config.quiz.question_timeout.as_secs(),
        admins = config.admins.len(),
        "Loaded quiz configuration"
    );

    // Question bank
    let bank = match &config.questions_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading question bank");
            QuestionBank::from_json_file(path)?
        }
        None => {
            tracing::warn!("QUIZ_QUESTIONS_PATH not set, using the built-in sample questions");
            QuestionBank::sample()
        }
    };
    tracing::info!(questions = bank.len(), "Question bank ready");

    // Create application state
    let transport = Arc::new(OutboxTransport::new());
    let store = Arc::new(SessionStore::new(
        Arc::new(bank),
        Arc::new(config.quiz.clone()),
        Arc::clone(&transport),
    ));
    let dispatcher = Arc::new(Dispatcher::new(store, config.admins.clone()));
    let state = AppState::new(Arc::clone(&dispatcher), transport);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Quizline server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop every session before exiting
    dispatcher.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! HTTP API for the bundled chat transport
//!
//! Inbound commands and answers arrive as JSON posts; outbound bot messages
//! are readable per chat and streamed over SSE.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::dispatch::Dispatcher;
use crate::transport::OutboxTransport;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher<OutboxTransport>>,
    pub transport: Arc<OutboxTransport>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher<OutboxTransport>>, transport: Arc<OutboxTransport>) -> Self {
        Self {
            dispatcher,
            transport,
        }
    }
}

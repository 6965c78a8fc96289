//! Server-Sent Events support

use crate::state_machine::ChatId;
use crate::transport::{OutboundEvent, OutboundMessage};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Stream one chat's outbound activity, starting with the messages already visible
pub fn sse_stream(
    chat_id: ChatId,
    backlog: Vec<OutboundMessage>,
    broadcast_rx: tokio::sync::broadcast::Receiver<OutboundEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        Ok(Event::default().event("init").data(
            json!({
                "type": "init",
                "chat_id": chat_id,
                "messages": backlog,
            })
            .to_string(),
        ))
    });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(move |result| match result {
        Ok(event) if event.chat_id() == chat_id => Some(Ok(outbound_to_axum(event))),
        Ok(_) => None,
        Err(_) => None, // Skip lagged messages
    });

    let combined = init.chain(broadcasts);

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn outbound_to_axum(event: OutboundEvent) -> Event {
    let (event_type, data) = match event {
        OutboundEvent::Message(message) => (
            "message",
            json!({
                "type": "message",
                "message": message
            }),
        ),
        OutboundEvent::Deleted {
            chat_id,
            message_ref,
        } => (
            "deleted",
            json!({
                "type": "deleted",
                "chat_id": chat_id,
                "message_ref": message_ref
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}

//! Live notification stream over server-sent events.
//!
//! The stream opens with a `connected` event, then carries one
//! `notification` event per delivery. A stream that sees no event for the
//! idle timeout is closed; the client reconnects and reconciles with a pull.

use crate::auth::CurrentActor;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::{self, Stream};
use murmur::{NotificationStream, StreamEvent};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Client reconnect delay sent with every event.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[instrument(skip(state))]
pub async fn notifications(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let session = state.coordinator.connect_stream(actor)?;
    info!(
        actor = session.actor(),
        session = session.session_id(),
        "Notification stream opened"
    );
    Ok(Sse::new(event_stream(session, state.stream_idle_timeout)))
}

fn event_stream(
    session: NotificationStream,
    idle: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(session, move |mut session| async move {
        loop {
            match tokio::time::timeout(idle, session.recv()).await {
                Ok(Some(event)) => {
                    if let Some(sse) = to_sse(&event) {
                        return Some((Ok(sse), session));
                    }
                }
                Ok(None) => {
                    debug!(session = session.session_id(), "Stream closed by broker");
                    return None;
                }
                Err(_) => {
                    info!(
                        actor = session.actor(),
                        session = session.session_id(),
                        "Closing idle notification stream"
                    );
                    return None;
                }
            }
        }
    })
}

fn to_sse(event: &StreamEvent) -> Option<Event> {
    let data = match event.data() {
        Ok(data) => data,
        Err(e) => {
            warn!("Dropping stream event: {}", e);
            return None;
        }
    };
    let sse = Event::default()
        .event(event.name())
        .data(data)
        .retry(RECONNECT_DELAY);
    Some(match event {
        StreamEvent::Notification(view) => sse.id(view.id.to_string()),
        StreamEvent::Connected => sse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use murmur::{NotificationBroker, NotificationKind, NotificationPayload};

    #[tokio::test]
    async fn test_stream_yields_connected_then_notification() {
        let broker = NotificationBroker::in_memory(8, 50);
        let session = broker.connect(7);
        let mut events = Box::pin(event_stream(session, Duration::from_secs(5)));

        assert!(events.next().await.is_some());

        broker
            .enqueue(
                7,
                NotificationKind::System,
                NotificationPayload {
                    creator_name: "System".to_string(),
                    content: "Maintenance tonight".to_string(),
                    ..Default::default()
                },
                1_000,
            )
            .unwrap();
        assert!(events.next().await.is_some());
    }

    #[tokio::test]
    async fn test_idle_stream_ends() {
        let broker = NotificationBroker::in_memory(8, 50);
        let session = broker.connect(7);
        let mut events = Box::pin(event_stream(session, Duration::from_millis(30)));

        // Connected arrives immediately, then nothing until the idle close.
        assert!(events.next().await.is_some());
        assert!(events.next().await.is_none());
        assert_eq!(broker.session_count(7), 0);
    }
}

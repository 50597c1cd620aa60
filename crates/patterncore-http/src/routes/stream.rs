use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use patterncore_sse::SseEvent;
use tokio_stream::{Stream, StreamExt};

use crate::state::AppState;

fn to_sse(event: SseEvent) -> Result<Event, Infallible> {
    Ok(Event::default().event(event.name()).json_data(event.data()).unwrap_or_else(|_| Event::default()))
}

/// One SSE connection per subscriber, fed by the broker's bounded queue
/// (see [`patterncore_sse::SseBroker::subscribe`]). A `connected` event is
/// emitted first, ahead of anything the broker itself fans out, so every
/// subscriber sees it exactly once regardless of publish timing. The
/// subscription is dropped, and so unregistered, when the client
/// disconnects and this stream is dropped.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.broker.subscribe();
    let greeting = tokio_stream::once(SseEvent::Connected { client_id: None });
    let events = greeting.chain(subscription).map(to_sse);
    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

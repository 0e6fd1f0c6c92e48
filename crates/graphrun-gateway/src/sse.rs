use std::convert::Infallible;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use graphrun_core::event::EventStream;

/// Forward a channel subscription as `event: <kind>` / `data: <json>` frames
/// until the server shuts down.
pub fn event_stream(
    events: EventStream,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let frames = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let frame = SseEvent::default()
            .event(event.kind().as_str())
            .data(event.data().to_string());
        Some((Ok(frame), events))
    })
    .take_until(async move { shutdown.cancelled().await });
    Sse::new(frames).keep_alive(KeepAlive::default())
}

//! Catalog change events shaped for an SSE-style sink.
//!
//! The stream emits one frame per catalog event and a keep-alive comment
//! frame whenever the subscription stays idle for the configured interval.
//! When `nb_events` is given, the stream ends after that many events;
//! dropping the stream releases the underlying subscription (the client
//! disconnected).

use catalog::ChangeEvent;
use futures::{Stream, StreamExt};
use std::time::Duration;

/// One frame of the event stream.
#[derive(Debug, Clone)]
pub enum EventFrame {
  Event(ChangeEvent),
  /// Idle ping; rendered as an SSE comment by the transport.
  KeepAlive,
}

struct FrameState<S> {
  events: S,
  keep_alive: Duration,
  remaining: Option<usize>,
}

/// Wrap a change-event stream with keep-alives and an optional event bound.
pub fn event_frames<S>(events: S, keep_alive: Duration, nb_events: Option<usize>) -> impl Stream<Item = EventFrame>
where
  S: Stream<Item = ChangeEvent> + Unpin,
{
  let state = FrameState {
    events,
    keep_alive,
    remaining: nb_events,
  };
  futures::stream::unfold(state, |mut state| async move {
    if state.remaining == Some(0) {
      return None;
    }
    match tokio::time::timeout(state.keep_alive, state.events.next()).await {
      Ok(Some(event)) => {
        if let Some(remaining) = state.remaining.as_mut() {
          *remaining -= 1;
        }
        Some((EventFrame::Event(event), state))
      }
      Ok(None) => None,
      Err(_) => Some((EventFrame::KeepAlive, state)),
    }
  })
}

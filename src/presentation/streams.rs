// Server-sent event streams for live signals, roster, app log and connector events
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::ApiError;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{future, Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

fn json_event<T: Serialize>(name: &'static str, data: &T) -> Result<Event, axum::Error> {
    Event::default().event(name).json_data(data)
}

/// Whole signal map on every change
pub async fn signals_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = WatchStream::new(state.store.watch_values())
        .map(|values| json_event("signals", &values))
        .take_until(state.stopping());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn runtimes_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = WatchStream::new(state.store.watch_runtimes())
        .map(|runtimes| json_event("runtimes", &runtimes))
        .take_until(state.stopping());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// New app log lines; lagging clients skip what they missed
pub async fn logs_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(state.store.subscribe_log())
        .filter_map(|entry| future::ready(entry.ok()))
        .map(|entry| json_event("log", &entry))
        .take_until(state.stopping());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run exits, deploy progress and mock signal lists of one connector
pub async fn connector_events(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let connector = state
        .connector(&name)
        .ok_or_else(|| ApiError::UnknownConnector(name.clone()))?;
    let stream = BroadcastStream::new(connector.subscribe_events())
        .filter_map(|event| future::ready(event.ok()))
        .map(|event| json_event("connector", &event))
        .take_until(state.stopping());
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

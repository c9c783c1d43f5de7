// Widget frame channel - vss-sync and control out, set-api-value in
use crate::application::frame_sync::forward_frame_message;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

pub async fn frames_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_frame(socket, state))
}

async fn handle_frame(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = BroadcastStream::new(state.frames.subscribe());
    let stopping = state.stopping();
    tokio::pin!(stopping);
    tracing::debug!("Widget frame attached ({} total)", state.frames.frame_count());

    loop {
        tokio::select! {
            _ = &mut stopping => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            item = outbound.next() => match item {
                Some(Ok(text)) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                    tracing::debug!("Widget frame skipped {} messages", n);
                }
                None => break,
            },
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let Some(primary) = state.primary_connector() else {
                        tracing::debug!("No primary connector for frame message");
                        continue;
                    };
                    if !forward_frame_message(&text, primary.commands()).await {
                        tracing::trace!("Frame message not forwarded: {}", text);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("Widget frame detached");
}

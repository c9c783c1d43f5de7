// Frame sync - Cross-frame messaging between the page and widget frames
use crate::application::dispatcher::RuntimeCommands;
use crate::application::signal_store::SignalStore;
use crate::domain::protocol::FrameMessage;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const VSS_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Fan-out of stringified JSON messages to every connected widget frame
#[derive(Clone)]
pub struct FrameBus {
    outbound: broadcast::Sender<String>,
}

impl Default for FrameBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBus {
    pub fn new() -> Self {
        let (outbound, _) = broadcast::channel(64);
        Self { outbound }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.outbound.subscribe()
    }

    pub fn frame_count(&self) -> usize {
        self.outbound.receiver_count()
    }

    pub fn post<T: Serialize>(&self, message: &T) {
        match serde_json::to_string(message) {
            // No frames connected is not an error
            Ok(text) => {
                let _ = self.outbound.send(text);
            }
            Err(e) => tracing::error!("Failed to encode frame message: {}", e),
        }
    }
}

/// Post the whole signal map to every frame each `period`
pub fn spawn_vss_sync(store: SignalStore, frames: FrameBus, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if frames.frame_count() == 0 {
                continue;
            }
            frames.post(&FrameMessage::VssSync {
                vss_data: store.values(),
            });
        }
    })
}

/// Extract a `set-api-value` write from a frame message, ignoring anything else
pub fn parse_set_api_value(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<FrameMessage>(text) {
        Ok(FrameMessage::SetApiValue { api, value }) => {
            let mut values = Map::new();
            values.insert(api, value);
            Some(values)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::trace!("Ignoring frame message: {}", e);
            None
        }
    }
}

/// Forward a user-driven value change from an embedded frame to the runtime
pub async fn forward_frame_message(text: &str, commands: &dyn RuntimeCommands) -> bool {
    match parse_set_api_value(text) {
        Some(values) => commands.write_signals_value(values).await,
        None => false,
    }
}

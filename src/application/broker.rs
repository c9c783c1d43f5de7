// Broker transport trait used by runtime connectors
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

pub const EVENT_REGISTER_CLIENT: &str = "register_client";
pub const EVENT_UNREGISTER_CLIENT: &str = "unregister_client";
pub const EVENT_LIST_ALL_KITS: &str = "list-all-kits";
pub const EVENT_LIST_ALL_KITS_RESULT: &str = "list-all-kits-result";
pub const EVENT_MESSAGE_TO_KIT: &str = "messageToKit";
pub const EVENT_KIT_REPLY: &str = "messageToKit-kitReply";
pub const EVENT_BROADCAST_TO_CLIENT: &str = "broadcastToClient";

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Connected,
    Disconnected,
    Message { event: String, payload: Value },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("transport closed")]
    Closed,
}

/// A persistent, shared connection to the message broker
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Emit a named event with an optional JSON payload
    async fn emit(&self, event: &str, payload: Option<Value>) -> Result<(), TransportError>;

    /// Every subscriber sees connect/disconnect and all inbound events
    fn subscribe(&self) -> broadcast::Receiver<BrokerEvent>;

    async fn close(&self);
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// In-memory transport that records emits and lets tests inject events
    pub struct RecordingTransport {
        connected: AtomicBool,
        sent: Mutex<Vec<(String, Option<Value>)>>,
        events: broadcast::Sender<BrokerEvent>,
    }

    impl RecordingTransport {
        pub fn new(connected: bool) -> Self {
            let (events, _) = broadcast::channel(64);
            Self {
                connected: AtomicBool::new(connected),
                sent: Mutex::new(Vec::new()),
                events,
            }
        }

        pub fn set_connected(&self, connected: bool) {
            self.connected.store(connected, Ordering::SeqCst);
            let event = if connected {
                BrokerEvent::Connected
            } else {
                BrokerEvent::Disconnected
            };
            let _ = self.events.send(event);
        }

        pub fn inject(&self, event: &str, payload: Value) {
            let _ = self.events.send(BrokerEvent::Message {
                event: event.to_string(),
                payload,
            });
        }

        pub fn sent(&self) -> Vec<(String, Option<Value>)> {
            self.sent.lock().unwrap().clone()
        }

        /// `cmd` of every `messageToKit` emit, in order
        pub fn sent_commands(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter(|(event, _)| event == EVENT_MESSAGE_TO_KIT)
                .filter_map(|(_, payload)| {
                    payload?.get("cmd")?.as_str().map(str::to_string)
                })
                .collect()
        }

        pub fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl BrokerTransport for RecordingTransport {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn emit(&self, event: &str, payload: Option<Value>) -> Result<(), TransportError> {
            if !self.is_connected() {
                return Err(TransportError::NotConnected);
            }
            self.sent
                .lock()
                .unwrap()
                .push((event.to_string(), payload));
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
            self.events.subscribe()
        }

        async fn close(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Poll `condition` until it holds or a second passes
    pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }
}

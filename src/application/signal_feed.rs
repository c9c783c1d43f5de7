// Live signal feed - Routes runtime replies into the store and event bus
use crate::application::signal_store::SignalWriter;
use crate::domain::protocol::KitReply;
use crate::domain::signal::parse_signal_values;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

/// Notifications for UI surfaces that react to runtime replies
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ConnectorEvent {
    AppExited { code: Option<i64> },
    DeployResponse { log: String, is_done: bool },
    MockSignals(Vec<Value>),
}

pub struct LiveSignalFeed {
    writer: SignalWriter,
    active: watch::Receiver<Option<String>>,
    events: broadcast::Sender<ConnectorEvent>,
}

impl LiveSignalFeed {
    pub fn new(
        writer: SignalWriter,
        active: watch::Receiver<Option<String>>,
        events: broadcast::Sender<ConnectorEvent>,
    ) -> Self {
        Self {
            writer,
            active,
            events,
        }
    }

    /// Handle one `messageToKit-kitReply` payload. Bad payloads are dropped.
    pub fn handle_reply(&self, payload: &Value) {
        let reply: KitReply = match serde_json::from_value(payload.clone()) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!("Ignoring malformed kit reply: {}", e);
                return;
            }
        };

        if let Some(kit_id) = &reply.kit_id {
            let active = self.active.borrow();
            if active.as_deref() != Some(kit_id.as_str()) {
                tracing::debug!(
                    "Discarding {} reply from {}, active is {:?}",
                    reply.cmd,
                    kit_id,
                    *active
                );
                return;
            }
        }

        match reply.cmd.as_str() {
            "apis-value" => self.apply_values(&reply),
            "run_python_app" => {
                if reply.is_done {
                    let code = reply.exit_code();
                    let shown = code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
                    self.writer.append_log(format!("Exit code {shown}"));
                    self.emit(ConnectorEvent::AppExited { code });
                } else {
                    self.writer.append_log(reply.result_text());
                }
            }
            "deploy_request" | "deploy-request" => {
                let log = reply.result_text();
                self.writer.append_log(log.clone());
                self.emit(ConnectorEvent::DeployResponse {
                    log,
                    is_done: reply.is_finish,
                });
            }
            "list_mock_signal" => match reply.data {
                Some(Value::Array(signals)) => self.emit(ConnectorEvent::MockSignals(signals)),
                _ => tracing::debug!("list_mock_signal reply without a signal list"),
            },
            other => tracing::trace!("Unhandled kit reply {}", other),
        }
    }

    fn apply_values(&self, reply: &KitReply) {
        let active = self.active.borrow().clone();
        if active.is_none() || reply.kit_id != active {
            tracing::debug!(
                "Discarding apis-value from {:?}, active is {:?}",
                reply.kit_id,
                active
            );
            return;
        }

        match &reply.result {
            Some(Value::Object(result)) => self.writer.merge_values(parse_signal_values(result)),
            _ => tracing::debug!("apis-value reply without a result object"),
        }
    }

    fn emit(&self, event: ConnectorEvent) {
        let _ = self.events.send(event);
    }
}

// Command dispatcher - Addressed commands to the active runtime
use crate::application::broker::{BrokerTransport, EVENT_MESSAGE_TO_KIT};
use crate::application::frame_sync::FrameBus;
use crate::application::signal_store::SignalWriter;
use crate::domain::protocol::{
    CodePayload, EmptyPayload, FrameAction, FrameControl, KitCommand, KitMessage, PrototypeRef,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    pub code: String,
    pub prototype: PrototypeRef,
    pub username: String,
    pub disable_code_convert: Option<bool>,
}

/// Commands a UI surface can issue against the active runtime.
///
/// Each call sends at most one message and returns whether it was sent.
/// Without an active runtime or a live connection the call is dropped.
#[async_trait]
pub trait RuntimeCommands: Send + Sync {
    async fn run_app(&self, code: &str) -> bool;
    async fn stop_app(&self) -> bool;
    async fn deploy(&self, request: DeployRequest) -> bool;
    async fn set_mock_signals(&self, signals: Vec<Value>) -> bool;
    async fn load_mock_signals(&self) -> bool;
    async fn write_signals_value(&self, values: Map<String, Value>) -> bool;
}

#[derive(Clone)]
pub struct CommandDispatcher {
    transport: Arc<dyn BrokerTransport>,
    active: watch::Receiver<Option<String>>,
    writer: SignalWriter,
    frames: Option<FrameBus>,
}

impl CommandDispatcher {
    pub fn new(
        transport: Arc<dyn BrokerTransport>,
        active: watch::Receiver<Option<String>>,
        writer: SignalWriter,
    ) -> Self {
        Self {
            transport,
            active,
            writer,
            frames: None,
        }
    }

    /// Also announce run/stop to embedded widget frames
    pub fn with_frames(mut self, frames: FrameBus) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn active_id(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    pub async fn send(&self, command: KitCommand) -> bool {
        let Some(to_kit_id) = self.active_id() else {
            tracing::warn!("No active runtime, dropping {}", command.name());
            return false;
        };
        self.send_to(&to_kit_id, command).await
    }

    pub async fn send_to(&self, to_kit_id: &str, command: KitCommand) -> bool {
        let name = command.name();
        if !self.transport.is_connected() {
            tracing::warn!("Broker not connected, dropping {} for {}", name, to_kit_id);
            return false;
        }

        let message = KitMessage {
            to_kit_id: to_kit_id.to_string(),
            command,
        };
        let payload = match serde_json::to_value(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to encode {}: {}", name, e);
                return false;
            }
        };

        match self.transport.emit(EVENT_MESSAGE_TO_KIT, Some(payload)).await {
            Ok(()) => {
                tracing::debug!("Sent {} to {}", name, to_kit_id);
                true
            }
            Err(e) => {
                tracing::error!("Failed to send {} to {}: {}", name, to_kit_id, e);
                false
            }
        }
    }

    pub async fn request_install_lib(&self, name: &str) -> bool {
        self.send(KitCommand::InstallPythonPackages {
            data: name.to_string(),
        })
        .await
    }

    pub async fn list_python_libs(&self) -> bool {
        self.send(KitCommand::ListPythonPackages).await
    }

    fn announce(&self, action: FrameAction) {
        if let Some(frames) = &self.frames {
            frames.post(&FrameControl { action });
        }
    }
}

#[async_trait]
impl RuntimeCommands for CommandDispatcher {
    async fn run_app(&self, code: &str) -> bool {
        let sent = self
            .send(KitCommand::RunPythonApp {
                data: CodePayload {
                    code: code.to_string(),
                },
            })
            .await;

        if sent {
            self.writer.append_log("run-app");
            self.announce(FrameAction::RunApp);
        } else {
            self.writer.append_log("Connect to compiler fail!");
        }
        sent
    }

    async fn stop_app(&self) -> bool {
        let sent = self
            .send(KitCommand::StopPythonApp {
                data: EmptyPayload::default(),
            })
            .await;
        if sent {
            self.announce(FrameAction::StopApp);
        }
        sent
    }

    async fn deploy(&self, request: DeployRequest) -> bool {
        if request.username.is_empty() || request.prototype.id.is_empty() {
            tracing::warn!("Deploy needs a known user and prototype, dropping request");
            return false;
        }

        self.send(KitCommand::DeployRequest {
            code: request.code,
            prototype: request.prototype,
            username: request.username,
            disable_code_convert: request.disable_code_convert,
        })
        .await
    }

    async fn set_mock_signals(&self, signals: Vec<Value>) -> bool {
        self.send(KitCommand::SetMockSignals { data: signals }).await
    }

    async fn load_mock_signals(&self) -> bool {
        self.send(KitCommand::ListMockSignal).await
    }

    async fn write_signals_value(&self, values: Map<String, Value>) -> bool {
        self.send(KitCommand::WriteSignalsValue { data: values }).await
    }
}

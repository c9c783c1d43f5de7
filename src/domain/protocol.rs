// Wire messages exchanged with the broker and with embedded widget frames
use crate::domain::signal::SignalValueMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity sent with `register_client`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub username: String,
    pub user_id: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrototypeRef {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodePayload {
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmptyPayload {}

/// Body of a `messageToKit` emit, tagged by `cmd`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd")]
pub enum KitCommand {
    #[serde(rename = "subscribe_apis")]
    SubscribeApis { apis: Vec<String> },
    #[serde(rename = "unsubscribe_apis")]
    UnsubscribeApis,
    #[serde(rename = "run_python_app")]
    RunPythonApp { data: CodePayload },
    #[serde(rename = "stop_python_app")]
    StopPythonApp { data: EmptyPayload },
    #[serde(rename = "set_mock_signals")]
    SetMockSignals { data: Vec<Value> },
    #[serde(rename = "list_mock_signal")]
    ListMockSignal,
    #[serde(rename = "write_signals_value")]
    WriteSignalsValue { data: Map<String, Value> },
    #[serde(rename = "deploy_request")]
    DeployRequest {
        code: String,
        prototype: PrototypeRef,
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        disable_code_convert: Option<bool>,
    },
    #[serde(rename = "install_python_packages")]
    InstallPythonPackages { data: String },
    #[serde(rename = "list_python_packages")]
    ListPythonPackages,
}

impl KitCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubscribeApis { .. } => "subscribe_apis",
            Self::UnsubscribeApis => "unsubscribe_apis",
            Self::RunPythonApp { .. } => "run_python_app",
            Self::StopPythonApp { .. } => "stop_python_app",
            Self::SetMockSignals { .. } => "set_mock_signals",
            Self::ListMockSignal => "list_mock_signal",
            Self::WriteSignalsValue { .. } => "write_signals_value",
            Self::DeployRequest { .. } => "deploy_request",
            Self::InstallPythonPackages { .. } => "install_python_packages",
            Self::ListPythonPackages => "list_python_packages",
        }
    }
}

/// A command addressed to one runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KitMessage {
    pub to_kit_id: String,
    #[serde(flatten)]
    pub command: KitCommand,
}

/// Payload of `messageToKit-kitReply`; fields depend on `cmd`
#[derive(Debug, Clone, Deserialize)]
pub struct KitReply {
    pub cmd: String,
    #[serde(default)]
    pub kit_id: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, rename = "isDone")]
    pub is_done: bool,
    #[serde(default)]
    pub is_finish: bool,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl KitReply {
    /// Process exit code, accepted as a number or numeric string
    pub fn exit_code(&self) -> Option<i64> {
        match self.code.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `result` as log text; strings are used verbatim
    pub fn result_text(&self) -> String {
        match &self.result {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Messages posted between the page and embedded widget frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum FrameMessage {
    #[serde(rename = "vss-sync")]
    VssSync {
        #[serde(rename = "vssData")]
        vss_data: SignalValueMap,
    },
    #[serde(rename = "set-api-value")]
    SetApiValue { api: String, value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameAction {
    RunApp,
    StopApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameControl {
    pub action: FrameAction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deploy_message_shape() {
        let message = KitMessage {
            to_kit_id: "runtime-2".to_string(),
            command: KitCommand::DeployRequest {
                code: "print(1)".to_string(),
                prototype: PrototypeRef {
                    name: "Blink".to_string(),
                    id: "p1".to_string(),
                },
                username: "alice".to_string(),
                disable_code_convert: None,
            },
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "cmd": "deploy_request",
                "to_kit_id": "runtime-2",
                "code": "print(1)",
                "prototype": {"name": "Blink", "id": "p1"},
                "username": "alice"
            })
        );
    }

    #[test]
    fn test_unit_and_empty_commands() {
        let stop = KitMessage {
            to_kit_id: "kit-1".to_string(),
            command: KitCommand::StopPythonApp {
                data: EmptyPayload::default(),
            },
        };
        assert_eq!(
            serde_json::to_value(&stop).unwrap(),
            json!({"cmd": "stop_python_app", "to_kit_id": "kit-1", "data": {}})
        );

        let unsubscribe = KitMessage {
            to_kit_id: "kit-1".to_string(),
            command: KitCommand::UnsubscribeApis,
        };
        assert_eq!(
            serde_json::to_value(&unsubscribe).unwrap(),
            json!({"cmd": "unsubscribe_apis", "to_kit_id": "kit-1"})
        );
    }

    #[test]
    fn test_kit_reply_fields() {
        let reply: KitReply = serde_json::from_value(json!({
            "cmd": "run_python_app",
            "kit_id": "runtime-2",
            "isDone": true,
            "code": 3,
            "result": null
        }))
        .unwrap();

        assert!(reply.is_done);
        assert_eq!(reply.exit_code(), Some(3));
        assert_eq!(reply.result_text(), "");
    }

    #[test]
    fn test_frame_messages() {
        let inbound: FrameMessage = serde_json::from_str(
            r#"{"cmd":"set-api-value","api":"Vehicle.Body.Lights.IsLowBeamOn","value":true}"#,
        )
        .unwrap();
        assert_eq!(
            inbound,
            FrameMessage::SetApiValue {
                api: "Vehicle.Body.Lights.IsLowBeamOn".to_string(),
                value: json!(true)
            }
        );

        let control = FrameControl {
            action: FrameAction::RunApp,
        };
        assert_eq!(
            serde_json::to_string(&control).unwrap(),
            r#"{"action":"run-app"}"#
        );
    }
}

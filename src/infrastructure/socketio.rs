// Socket.IO v5 / Engine.IO v4 text codec for the broker connection
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const SOCKET_IO_PATH: &str = "/socket.io/";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type {0:?}")]
    UnknownType(char),
    #[error("binary packets are not supported")]
    Binary,
    #[error("malformed packet body: {0}")]
    Malformed(String),
    #[error("unsupported broker url scheme {0}")]
    Scheme(String),
}

/// Body of the Engine.IO `open` packet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

impl OpenHandshake {
    /// How long to wait for the server's next ping before giving up
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let body = chars.as_str();

        match kind {
            '0' => serde_json::from_str(body)
                .map(EnginePacket::Open)
                .map_err(|e| CodecError::Malformed(e.to_string())),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body.to_string())),
            '3' => Ok(EnginePacket::Pong(body.to_string())),
            '4' => Ok(EnginePacket::Message(body.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(CodecError::Binary),
            other => Err(CodecError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            // Clients never send open; the server ignores it anyway
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet on the default namespace
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        event: String,
        payload: Option<Value>,
        ack_id: Option<u64>,
    },
    Ack {
        id: u64,
        data: Value,
    },
    ConnectError(Value),
}

impl SocketPacket {
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        if matches!(kind, '5' | '6') {
            return Err(CodecError::Binary);
        }
        let mut rest = chars.as_str();

        // Optional namespace, terminated by ','
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(end) => &rest[end + 1..],
                None => "",
            };
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            rest[..digits].parse::<u64>().ok()
        } else {
            None
        };
        let body = &rest[digits..];
        let data = if body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(body)
                    .map_err(|e| CodecError::Malformed(e.to_string()))?,
            )
        };

        match kind {
            '0' => Ok(SocketPacket::Connect(data)),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let Some(Value::Array(mut items)) = data else {
                    return Err(CodecError::Malformed("event without an array body".into()));
                };
                if items.is_empty() {
                    return Err(CodecError::Malformed("event without a name".into()));
                }
                let event = match items.remove(0) {
                    Value::String(event) => event,
                    other => return Err(CodecError::Malformed(format!("event name {other}"))),
                };
                Ok(SocketPacket::Event {
                    event,
                    payload: items.into_iter().next(),
                    ack_id,
                })
            }
            '3' => Ok(SocketPacket::Ack {
                id: ack_id.ok_or_else(|| CodecError::Malformed("ack without id".into()))?,
                data: data.unwrap_or(Value::Null),
            }),
            '4' => Ok(SocketPacket::ConnectError(data.unwrap_or(Value::Null))),
            other => Err(CodecError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{auth}"),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event {
                event,
                payload,
                ack_id,
            } => {
                let mut items = vec![Value::String(event.clone())];
                items.extend(payload.clone());
                let ack = ack_id.map(|id| id.to_string()).unwrap_or_default();
                format!("2{}{}", ack, Value::Array(items))
            }
            SocketPacket::Ack { id, data } => format!("3{id}{data}"),
            SocketPacket::ConnectError(data) => format!("4{data}"),
        }
    }
}

/// Full websocket frame text for an event on the default namespace
pub fn encode_event(event: &str, payload: Option<Value>) -> String {
    let packet = SocketPacket::Event {
        event: event.to_string(),
        payload,
        ack_id: None,
    };
    EnginePacket::Message(packet.encode()).encode()
}

/// Turn the configured broker address into the Engine.IO websocket endpoint
pub fn websocket_url(base: &Url) -> Result<Url, CodecError> {
    let mut url = base.clone();
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(CodecError::Scheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| CodecError::Scheme(base.scheme().to_string()))?;
    url.set_path(SOCKET_IO_PATH);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

// Socket.IO broker transport over tokio-tungstenite with automatic reconnect
use crate::application::broker::{BrokerEvent, BrokerTransport, TransportError};
use crate::infrastructure::socketio::{
    encode_event, websocket_url, CodecError, EnginePacket, SocketPacket,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

// Used until the server's open packet tells us its ping schedule
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);
const OUTBOUND_CAPACITY: usize = 256;
const EVENT_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub url: Url,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

struct Shared {
    connected: AtomicBool,
    events: broadcast::Sender<BrokerEvent>,
}

impl Shared {
    fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            let event = if connected {
                BrokerEvent::Connected
            } else {
                BrokerEvent::Disconnected
            };
            let _ = self.events.send(event);
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// One process-wide broker connection shared by every connector
pub struct SocketIoTransport {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<String>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SocketIoTransport {
    /// Start connecting in the background. Connection state is reported
    /// through `subscribe()`.
    pub fn connect(settings: TransportSettings) -> Result<Self, CodecError> {
        let endpoint = websocket_url(&settings.url)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            events,
        });
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run(
            endpoint,
            settings,
            shared.clone(),
            outbound_rx,
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            outbound,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }
}

#[async_trait]
impl BrokerTransport for SocketIoTransport {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: &str, payload: Option<Value>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(encode_event(event, payload))
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.shared.events.subscribe()
    }

    async fn close(&self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::error!("Broker transport task failed: {}", e);
            }
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max { max } else { next }
}

/// Sleep unless shutdown is requested first; returns true on shutdown
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        _ = shutdown.changed() => true,
    }
}

async fn run(
    endpoint: Url,
    settings: TransportSettings,
    shared: Arc<Shared>,
    mut outbound: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = settings.reconnect_initial;
    loop {
        if *shutdown.borrow() {
            break;
        }

        tracing::debug!("Connecting to broker at {}", endpoint);
        let connect = tokio::select! {
            result = connect_async(endpoint.as_str()) => result,
            _ = shutdown.changed() => break,
        };
        let socket = match connect {
            Ok((socket, _)) => socket,
            Err(e) => {
                tracing::warn!("Broker connect failed: {}", e);
                if pause(backoff, &mut shutdown).await {
                    break;
                }
                backoff = next_backoff(backoff, settings.reconnect_max);
                continue;
            }
        };

        let end = session(socket, &shared, &mut outbound, &mut shutdown).await;
        // Only a session the broker accepted with a Socket.IO connect resets the backoff
        let established = shared.connected.load(Ordering::SeqCst);
        shared.set_connected(false);
        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost(reason) => {
                tracing::warn!("Broker connection lost: {}", reason);
                if established {
                    backoff = settings.reconnect_initial;
                }
                if pause(backoff, &mut shutdown).await {
                    break;
                }
                backoff = next_backoff(backoff, settings.reconnect_max);
            }
        }
    }

    shared.set_connected(false);
    tracing::info!("Broker transport stopped");
}

async fn session(
    socket: Socket,
    shared: &Shared,
    outbound: &mut mpsc::Receiver<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = HANDSHAKE_TIMEOUT;
    let mut deadline = Instant::now() + heartbeat;

    loop {
        let connected = shared.connected.load(Ordering::SeqCst);
        tokio::select! {
            _ = shutdown.changed() => {
                let goodbye = EnginePacket::Message(SocketPacket::Disconnect.encode()).encode();
                let _ = sink.send(Message::Text(goodbye)).await;
                let _ = sink.close().await;
                return SessionEnd::Shutdown;
            }
            _ = tokio::time::sleep_until(deadline) => {
                return SessionEnd::Lost(format!("no ping within {heartbeat:?}"));
            }
            Some(frame) = outbound.recv(), if connected => {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    return SessionEnd::Lost(e.to_string());
                }
            }
            message = stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::Lost("closed by broker".to_string());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                };

                let packet = match EnginePacket::decode(&text) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::debug!("Ignoring engine packet {:?}: {}", text, e);
                        continue;
                    }
                };

                let reply = match packet {
                    EnginePacket::Open(open) => {
                        tracing::debug!("Engine.IO session {} opened", open.sid);
                        heartbeat = open.heartbeat_timeout();
                        deadline = Instant::now() + heartbeat;
                        Some(EnginePacket::Message(SocketPacket::Connect(None).encode()))
                    }
                    EnginePacket::Ping(data) => {
                        deadline = Instant::now() + heartbeat;
                        Some(EnginePacket::Pong(data))
                    }
                    EnginePacket::Close => return SessionEnd::Lost("engine close".to_string()),
                    EnginePacket::Message(body) => {
                        if let Err(reason) = on_socket_packet(&body, shared, outbound) {
                            return SessionEnd::Lost(reason);
                        }
                        None
                    }
                    _ => None,
                };

                if let Some(reply) = reply {
                    if let Err(e) = sink.send(Message::Text(reply.encode())).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
            }
        }
    }
}

fn on_socket_packet(
    body: &str,
    shared: &Shared,
    outbound: &mut mpsc::Receiver<String>,
) -> Result<(), String> {
    let packet = match SocketPacket::decode(body) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::debug!("Ignoring socket packet {:?}: {}", body, e);
            return Ok(());
        }
    };

    match packet {
        SocketPacket::Connect(_) => {
            // Frames queued before the connection dropped are stale
            let mut dropped = 0;
            while outbound.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                tracing::debug!("Dropped {} stale outbound frames", dropped);
            }
            tracing::info!("Connected to broker");
            shared.set_connected(true);
        }
        SocketPacket::Event { event, payload, .. } => {
            let _ = shared.events.send(BrokerEvent::Message {
                event,
                payload: payload.unwrap_or(Value::Null),
            });
        }
        SocketPacket::Disconnect => return Err("disconnected by broker".to_string()),
        SocketPacket::ConnectError(reason) => return Err(format!("connect refused: {reason}")),
        SocketPacket::Ack { id, .. } => tracing::trace!("Unexpected ack {}", id),
    }
    Ok(())
}

// Runtime connector - Registration, target selection, subscriptions and replies
use crate::application::broker::{
    BrokerEvent, BrokerTransport, EVENT_BROADCAST_TO_CLIENT, EVENT_KIT_REPLY, EVENT_LIST_ALL_KITS,
    EVENT_LIST_ALL_KITS_RESULT, EVENT_REGISTER_CLIENT, EVENT_UNREGISTER_CLIENT,
};
use crate::application::dispatcher::{CommandDispatcher, DeployRequest, RuntimeCommands};
use crate::application::error::ConnectorError;
use crate::application::frame_sync::FrameBus;
use crate::application::registry::RuntimeRegistry;
use crate::application::signal_feed::{ConnectorEvent, LiveSignalFeed};
use crate::application::signal_store::{SignalStore, SignalWriter, WizardSlot};
use crate::application::target_selector::{SelectionStore, TargetSelector};
use crate::domain::protocol::{ClientIdentity, KitCommand};
use crate::domain::runtime::RuntimeEndpoint;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_RESUBSCRIBE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub name: String,
    pub target_prefix: String,
    pub storage_key: String,
    /// Writes into the process-wide signal store instead of a private one
    pub primary: bool,
    pub owns_wizard: bool,
    pub resubscribe_interval: Duration,
    pub identity: ClientIdentity,
}

enum Control {
    Select {
        kit_id: String,
        reply: oneshot::Sender<Result<(), ConnectorError>>,
    },
    SetUsedApis(Vec<String>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployOutcome {
    pub log: Vec<String>,
}

/// Cloneable handle to a running connector
#[derive(Clone)]
pub struct ConnectorHandle {
    name: String,
    prefix: String,
    dispatcher: CommandDispatcher,
    store: SignalStore,
    active: watch::Receiver<Option<String>>,
    events: broadcast::Sender<ConnectorEvent>,
    control: mpsc::Sender<Control>,
}

impl ConnectorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn commands(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn active_id(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    pub fn roster(&self) -> Vec<RuntimeEndpoint> {
        self.store.runtimes()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }

    pub async fn select(&self, kit_id: &str) -> Result<(), ConnectorError> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Select {
                kit_id: kit_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| ConnectorError::Stopped)?;
        rx.await.map_err(|_| ConnectorError::Stopped)?
    }

    /// Replace the list of signal names the active runtime should push
    pub async fn set_used_apis(&self, apis: Vec<String>) -> Result<(), ConnectorError> {
        self.control
            .send(Control::SetUsedApis(apis))
            .await
            .map_err(|_| ConnectorError::Stopped)
    }

    /// Send a deploy request and collect progress until the runtime reports
    /// completion. A timeout does not cancel the deploy; later replies still
    /// reach the app log.
    pub async fn deploy_and_wait(
        &self,
        request: DeployRequest,
        timeout: Duration,
    ) -> Result<DeployOutcome, ConnectorError> {
        let mut events = self.events.subscribe();
        if !self.dispatcher.deploy(request).await {
            return Err(ConnectorError::NotSent("deploy_request"));
        }

        let mut log = Vec::new();
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(ConnectorEvent::DeployResponse { log: line, is_done }) => {
                        log.push(line);
                        if is_done {
                            return Ok(());
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Deploy watcher missed {} events", n);
                    }
                    Err(RecvError::Closed) => return Err(ConnectorError::Stopped),
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(())) => Ok(DeployOutcome { log }),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!("Deploy on {} timed out after {:?}", self.name, timeout);
                Err(ConnectorError::RequestTimeout(timeout))
            }
        }
    }

    pub async fn shutdown(&self) -> Result<(), ConnectorError> {
        let (done, rx) = oneshot::channel();
        self.control
            .send(Control::Shutdown(done))
            .await
            .map_err(|_| ConnectorError::Stopped)?;
        rx.await.map_err(|_| ConnectorError::Stopped)
    }
}

pub struct RuntimeConnector {
    settings: ConnectorSettings,
    transport: Arc<dyn BrokerTransport>,
    registry: RuntimeRegistry,
    selector: TargetSelector,
    dispatcher: CommandDispatcher,
    feed: LiveSignalFeed,
    writer: SignalWriter,
    wizard: Option<WizardSlot>,
    used_apis: Vec<String>,
    subscribed_to: Option<String>,
}

impl RuntimeConnector {
    /// Start a connector on a shared transport and return its handle
    pub fn start(
        settings: ConnectorSettings,
        transport: Arc<dyn BrokerTransport>,
        shared: &SignalStore,
        selections: Arc<dyn SelectionStore>,
        frames: Option<FrameBus>,
    ) -> Result<ConnectorHandle, ConnectorError> {
        let writer = if settings.primary {
            shared.claim_writer().ok_or(ConnectorError::PrimaryTaken)?
        } else {
            SignalStore::new()
                .claim_writer()
                .ok_or(ConnectorError::PrimaryTaken)?
        };
        let wizard = if settings.owns_wizard {
            Some(shared.claim_wizard_slot().ok_or(ConnectorError::WizardTaken)?)
        } else {
            None
        };

        let selector = TargetSelector::new(settings.storage_key.clone(), selections);
        let mut dispatcher =
            CommandDispatcher::new(transport.clone(), selector.watch(), writer.clone());
        if let Some(frames) = frames {
            dispatcher = dispatcher.with_frames(frames);
        }
        let (events, _) = broadcast::channel(64);
        let feed = LiveSignalFeed::new(writer.clone(), selector.watch(), events.clone());
        let (control_tx, control_rx) = mpsc::channel(16);

        let handle = ConnectorHandle {
            name: settings.name.clone(),
            prefix: settings.target_prefix.clone(),
            dispatcher: dispatcher.clone(),
            store: writer.store().clone(),
            active: selector.watch(),
            events,
            control: control_tx,
        };

        let broker_events = transport.subscribe();
        let active_changes = selector.watch();
        let connector = Self {
            registry: RuntimeRegistry::new(settings.target_prefix.clone()),
            settings,
            transport,
            selector,
            dispatcher,
            feed,
            writer,
            wizard,
            used_apis: Vec::new(),
            subscribed_to: None,
        };
        tokio::spawn(connector.run(broker_events, active_changes, control_rx));

        Ok(handle)
    }

    async fn run(
        mut self,
        mut broker_events: broadcast::Receiver<BrokerEvent>,
        mut active_changes: watch::Receiver<Option<String>>,
        mut control: mpsc::Receiver<Control>,
    ) {
        let period = self.settings.resubscribe_interval;
        let mut resubscribe = tokio::time::interval_at(Instant::now() + period, period);
        resubscribe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Connector {} started for prefix {}",
            self.settings.name,
            self.settings.target_prefix
        );
        if self.transport.is_connected() {
            self.register().await;
        }

        loop {
            tokio::select! {
                event = broker_events.recv() => match event {
                    Ok(BrokerEvent::Connected) => self.register().await,
                    Ok(BrokerEvent::Disconnected) => {
                        tracing::warn!("Connector {} lost the broker connection", self.settings.name);
                        self.subscribed_to = None;
                    }
                    Ok(BrokerEvent::Message { event, payload }) => {
                        self.handle_message(&event, &payload);
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Connector {} missed {} broker events", self.settings.name, n);
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("Broker event stream closed for {}", self.settings.name);
                        break;
                    }
                },
                changed = active_changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.on_active_changed().await;
                }
                _ = resubscribe.tick() => self.subscribe_active().await,
                message = control.recv() => match message {
                    Some(Control::Select { kit_id, reply }) => {
                        let result = self.selector.select(&kit_id, self.registry.roster());
                        if result.is_ok() {
                            self.update_wizard();
                        }
                        let _ = reply.send(result);
                    }
                    Some(Control::SetUsedApis(apis)) => {
                        self.used_apis = apis;
                        self.subscribe_active().await;
                    }
                    Some(Control::Shutdown(done)) => {
                        self.teardown().await;
                        let _ = done.send(());
                        return;
                    }
                    None => break,
                },
            }
        }

        self.teardown().await;
    }

    async fn register(&mut self) {
        let identity = match serde_json::to_value(&self.settings.identity) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!("Failed to encode client identity: {}", e);
                return;
            }
        };
        if let Err(e) = self.transport.emit(EVENT_REGISTER_CLIENT, Some(identity)).await {
            tracing::warn!("register_client failed for {}: {}", self.settings.name, e);
            return;
        }
        if let Err(e) = self.transport.emit(EVENT_LIST_ALL_KITS, None).await {
            tracing::warn!("list-all-kits failed for {}: {}", self.settings.name, e);
        }

        // The broker forgets subscriptions across reconnects
        self.subscribed_to = None;
        self.subscribe_active().await;
    }

    fn handle_message(&mut self, event: &str, payload: &Value) {
        match event {
            EVENT_LIST_ALL_KITS_RESULT => self.on_roster(payload),
            EVENT_KIT_REPLY => self.feed.handle_reply(payload),
            EVENT_BROADCAST_TO_CLIENT => tracing::trace!("broadcastToClient: {}", payload),
            other => tracing::trace!("Ignoring broker event {}", other),
        }
    }

    fn on_roster(&mut self, payload: &Value) {
        let roster = match self.registry.apply_snapshot(payload) {
            Ok(roster) => roster.to_vec(),
            Err(e) => {
                tracing::warn!("Ignoring malformed roster for {}: {}", self.settings.name, e);
                return;
            }
        };

        self.writer.publish_runtimes(roster.clone());
        self.selector.reselect(&roster);
        self.update_wizard();
    }

    fn update_wizard(&self) {
        if let Some(wizard) = &self.wizard {
            wizard.set(self.selector.active_id());
        }
    }

    async fn on_active_changed(&mut self) {
        let active = self.selector.active_id();
        if active.is_some() && self.subscribed_to == active {
            return;
        }
        if let Some(previous) = self.subscribed_to.take() {
            self.dispatcher
                .send_to(&previous, KitCommand::UnsubscribeApis)
                .await;
        }
        self.subscribe_active().await;
    }

    async fn subscribe_active(&mut self) {
        let Some(active) = self.selector.active_id() else {
            return;
        };

        if self.used_apis.is_empty() {
            if self.subscribed_to.take().is_some() {
                self.dispatcher
                    .send_to(&active, KitCommand::UnsubscribeApis)
                    .await;
            }
            return;
        }

        let command = KitCommand::SubscribeApis {
            apis: self.used_apis.clone(),
        };
        if self.dispatcher.send_to(&active, command).await {
            self.subscribed_to = Some(active);
        }
    }

    async fn teardown(&mut self) {
        if let Some(active) = self.selector.active_id() {
            self.dispatcher
                .send_to(&active, KitCommand::UnsubscribeApis)
                .await;
        }
        if self.transport.is_connected() {
            if let Err(e) = self
                .transport
                .emit(EVENT_UNREGISTER_CLIENT, Some(json!({})))
                .await
            {
                tracing::warn!("unregister_client failed for {}: {}", self.settings.name, e);
            }
        }
        tracing::info!("Connector {} stopped", self.settings.name);
    }
}

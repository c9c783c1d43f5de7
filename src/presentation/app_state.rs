// Application state for HTTP handlers
use crate::application::connector::ConnectorHandle;
use crate::application::dashboard_service::DashboardService;
use crate::application::deploy_service::DeployService;
use crate::application::frame_sync::FrameBus;
use crate::application::signal_store::SignalStore;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub connectors: Vec<ConnectorHandle>,
    pub primary: Option<String>,
    pub store: SignalStore,
    pub dashboard_service: DashboardService,
    pub deploy_service: Option<DeployService>,
    pub frames: FrameBus,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn connector(&self, name: &str) -> Option<&ConnectorHandle> {
        self.connectors.iter().find(|c| c.name() == name)
    }

    /// The connector that writes into the shared signal store
    pub fn primary_connector(&self) -> Option<&ConnectorHandle> {
        self.primary.as_deref().and_then(|name| self.connector(name))
    }

    /// Resolves once the server starts shutting down
    pub fn stopping(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut shutdown = self.shutdown.clone();
        async move {
            let _ = shutdown.wait_for(|stopping| *stopping).await;
        }
    }
}

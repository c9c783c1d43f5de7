// Deploy service - Use case for deploying a stored prototype to a runtime
use crate::application::connector::{ConnectorHandle, DeployOutcome, DEFAULT_REQUEST_TIMEOUT};
use crate::application::dispatcher::DeployRequest;
use crate::application::prototype_repository::PrototypeRepository;
use crate::domain::protocol::PrototypeRef;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Overrides the stored prototype code
    pub code: Option<String>,
    pub disable_code_convert: Option<bool>,
}

#[derive(Clone)]
pub struct DeployService {
    repository: Arc<dyn PrototypeRepository>,
    username: String,
    timeout: Duration,
}

impl DeployService {
    pub fn new(repository: Arc<dyn PrototypeRepository>, username: impl Into<String>) -> Self {
        Self {
            repository,
            username: username.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn deploy_prototype(
        &self,
        connector: &ConnectorHandle,
        prototype_id: &str,
        options: DeployOptions,
    ) -> anyhow::Result<DeployOutcome> {
        let prototype = self
            .repository
            .get_prototype(prototype_id)
            .await
            .with_context(|| format!("Failed to load prototype {prototype_id}"))?;

        tracing::info!(
            "Deploying prototype {} to {:?} via {}",
            prototype.id,
            connector.active_id(),
            connector.name()
        );

        let request = DeployRequest {
            code: options.code.unwrap_or(prototype.code),
            prototype: PrototypeRef {
                name: prototype.name,
                id: prototype.id,
            },
            username: self.username.clone(),
            disable_code_convert: options.disable_code_convert,
        };

        Ok(connector.deploy_and_wait(request, self.timeout).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::broker::testing::{eventually, RecordingTransport};
    use crate::application::broker::{EVENT_KIT_REPLY, EVENT_LIST_ALL_KITS_RESULT};
    use crate::application::connector::{ConnectorSettings, RuntimeConnector};
    use crate::application::error::ConnectorError;
    use crate::application::prototype_repository::Prototype;
    use crate::application::signal_store::SignalStore;
    use crate::domain::protocol::ClientIdentity;
    use crate::infrastructure::selection_store::testing::MemorySelectionStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeRepository;

    #[async_trait]
    impl PrototypeRepository for FakeRepository {
        async fn get_prototype(&self, id: &str) -> anyhow::Result<Prototype> {
            if id != "p1" {
                anyhow::bail!("prototype {} not found", id);
            }
            Ok(Prototype {
                id: "p1".to_string(),
                name: "Blink".to_string(),
                code: "print('blink')".to_string(),
            })
        }
    }

    fn connector(transport: &Arc<RecordingTransport>) -> ConnectorHandle {
        let settings = ConnectorSettings {
            name: "runtime".to_string(),
            target_prefix: "runtime-".to_string(),
            storage_key: "last-rt".to_string(),
            primary: true,
            owns_wizard: false,
            resubscribe_interval: Duration::from_secs(60),
            identity: ClientIdentity {
                username: "alice".to_string(),
                user_id: "u1".to_string(),
                domain: "digital.auto".to_string(),
            },
        };
        RuntimeConnector::start(
            settings,
            transport.clone(),
            &SignalStore::new(),
            Arc::new(MemorySelectionStore::default()),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_deploy_uses_stored_code() {
        let transport = Arc::new(RecordingTransport::new(true));
        let handle = connector(&transport);
        transport.inject(
            EVENT_LIST_ALL_KITS_RESULT,
            json!([{"kit_id": "runtime-1", "name": "Car", "is_online": true}]),
        );
        assert!(eventually(|| handle.active_id().is_some()).await);

        let service = DeployService::new(Arc::new(FakeRepository), "alice");
        let task = {
            let handle = handle.clone();
            tokio::spawn(async move {
                service
                    .deploy_prototype(&handle, "p1", DeployOptions::default())
                    .await
            })
        };

        assert!(eventually(|| transport.sent_commands().contains(&"deploy_request".to_string())).await);
        transport.inject(
            EVENT_KIT_REPLY,
            json!({"cmd": "deploy_request", "result": "ok", "is_finish": true}),
        );

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.log, vec!["ok"]);

        let (_, payload) = transport
            .sent()
            .into_iter()
            .find(|(_, p)| p.as_ref().is_some_and(|p| p["cmd"] == "deploy_request"))
            .unwrap();
        let payload = payload.unwrap();
        assert_eq!(payload["code"], json!("print('blink')"));
        assert_eq!(payload["username"], json!("alice"));
        assert_eq!(payload["prototype"], json!({"name": "Blink", "id": "p1"}));
    }

    #[tokio::test]
    async fn test_deploy_errors() {
        let transport = Arc::new(RecordingTransport::new(true));
        let handle = connector(&transport);
        let service = DeployService::new(Arc::new(FakeRepository), "alice")
            .with_timeout(Duration::from_millis(20));

        let missing = service
            .deploy_prototype(&handle, "nope", DeployOptions::default())
            .await;
        assert!(missing.is_err());

        let no_target = service
            .deploy_prototype(&handle, "p1", DeployOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            no_target.downcast_ref::<ConnectorError>(),
            Some(ConnectorError::NotSent(_))
        ));
    }
}

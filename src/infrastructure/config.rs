use crate::application::connector::{
    ConnectorSettings, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RESUBSCRIBE_INTERVAL,
};
use crate::domain::dashboard::WidgetPlacement;
use crate::domain::protocol::ClientIdentity;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectorConfig {
    pub broker: BrokerSettings,
    #[serde(default = "default_identity")]
    pub identity: ClientIdentity,
    #[serde(default)]
    pub api: Option<ApiSettings>,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub connectors: Vec<ConnectorEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub url: String,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_deploy_timeout_secs")]
    pub deploy_timeout_secs: u64,
}

impl ApiSettings {
    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    #[serde(default = "default_selection_file")]
    pub selection_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            selection_file: default_selection_file(),
        }
    }
}

/// One connector instance, scoped to a runtime id prefix
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectorEntry {
    pub name: String,
    pub target_prefix: String,
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub owns_wizard: bool,
    #[serde(default = "default_resubscribe_secs")]
    pub resubscribe_secs: u64,
}

impl ConnectorEntry {
    pub fn storage_key(&self) -> String {
        self.storage_key.clone().unwrap_or_else(|| {
            format!("last-wizard-rt-{}", self.target_prefix.to_lowercase())
        })
    }

    pub fn to_settings(&self, identity: &ClientIdentity) -> ConnectorSettings {
        ConnectorSettings {
            name: self.name.clone(),
            target_prefix: self.target_prefix.clone(),
            storage_key: self.storage_key(),
            primary: self.primary,
            owns_wizard: self.owns_wizard,
            resubscribe_interval: Duration::from_secs(self.resubscribe_secs.max(1)),
            identity: identity.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub widgets: Vec<WidgetPlacement>,
}

fn default_identity() -> ClientIdentity {
    ClientIdentity {
        username: "test".to_string(),
        user_id: "test".to_string(),
        domain: "domain".to_string(),
    }
}

fn default_reconnect_initial_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    10_000
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_selection_file() -> String {
    "data/selection.json".to_string()
}

fn default_deploy_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_resubscribe_secs() -> u64 {
    DEFAULT_RESUBSCRIBE_INTERVAL.as_secs()
}

impl ConnectorConfig {
    /// Reject configurations that would break single-owner rules at startup
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connectors.is_empty() {
            anyhow::bail!("at least one connector must be configured");
        }

        let mut names = HashSet::new();
        for entry in &self.connectors {
            if !names.insert(entry.name.as_str()) {
                anyhow::bail!("duplicate connector name {}", entry.name);
            }
            if entry.target_prefix.trim().is_empty() {
                anyhow::bail!("connector {} has an empty target_prefix", entry.name);
            }
        }

        let primaries = self.connectors.iter().filter(|c| c.primary).count();
        if primaries > 1 {
            anyhow::bail!("only one connector may be primary, found {}", primaries);
        }
        let wizard_owners = self.connectors.iter().filter(|c| c.owns_wizard).count();
        if wizard_owners > 1 {
            anyhow::bail!("only one connector may own the wizard selection, found {}", wizard_owners);
        }

        Ok(())
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.broker.reconnect_initial_ms.max(1))
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.broker.reconnect_max_ms).max(self.reconnect_initial())
    }
}

pub fn load_connector_config() -> anyhow::Result<ConnectorConfig> {
    let settings = Config::builder()
        .add_source(File::with_name("config/connector"))
        .add_source(Environment::with_prefix("CONNECTOR").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = Config::builder()
        .add_source(File::with_name("config/dashboard").required(false))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> ConnectorConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const SAMPLE: &str = r#"
        [broker]
        url = "https://kit.digitalauto.tech"

        [[connectors]]
        name = "runtime"
        target_prefix = "Runtime-"
        primary = true

        [[connectors]]
        name = "kit"
        target_prefix = "kit-"
        storage_key = "last-rt"
        owns_wizard = true
        resubscribe_secs = 10
    "#;

    #[test]
    fn test_defaults_and_storage_keys() {
        let config = parse(SAMPLE);
        config.validate().unwrap();

        assert_eq!(config.identity.username, "test");
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.reconnect_initial(), Duration::from_secs(1));
        assert_eq!(config.reconnect_max(), Duration::from_secs(10));
        assert!(config.api.is_none());

        let runtime = config.connectors[0].to_settings(&config.identity);
        assert_eq!(runtime.storage_key, "last-wizard-rt-runtime-");
        assert_eq!(runtime.resubscribe_interval, Duration::from_secs(30));

        let kit = config.connectors[1].to_settings(&config.identity);
        assert_eq!(kit.storage_key, "last-rt");
        assert_eq!(kit.resubscribe_interval, Duration::from_secs(10));
        assert!(kit.owns_wizard && !kit.primary);
    }

    #[test]
    fn test_api_deploy_timeout() {
        let config = parse(&format!(
            "{SAMPLE}\n[api]\nbase_url = \"https://backend.example/v2\"\n"
        ));
        let api = config.api.unwrap();
        assert_eq!(api.token, None);
        assert_eq!(api.deploy_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_two_primaries() {
        let mut config = parse(SAMPLE);
        config.connectors[1].primary = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_blank_prefix() {
        let mut config = parse(SAMPLE);
        config.connectors[1].name = "runtime".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(SAMPLE);
        config.connectors[1].target_prefix = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(SAMPLE);
        config.connectors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dashboard_config() {
        let config: DashboardConfig = Config::builder()
            .add_source(File::from_str(
                r#"
                [[widgets]]
                widget = "Speedometer"
                url = "https://store-be.digitalauto.tech/widgets/speed.html"
                boxes = [1, 2, 6, 7]
                options = { api = "Vehicle.Speed", url = "ignored" }
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.widgets.len(), 1);
        assert_eq!(config.widgets[0].boxes, vec![1, 2, 6, 7]);
        assert_eq!(config.widgets[0].plugin, "");
    }
}

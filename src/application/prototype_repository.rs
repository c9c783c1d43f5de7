// Repository trait for prototype data access
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prototype {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: String,
}

#[async_trait]
pub trait PrototypeRepository: Send + Sync {
    /// Fetch one prototype with its current code
    async fn get_prototype(&self, id: &str) -> anyhow::Result<Prototype>;
}

// Prototype repository backed by the digital.auto REST API
use crate::application::prototype_repository::{Prototype, PrototypeRepository};
use anyhow::{Context, Result};
use async_trait::async_trait;

pub struct HttpPrototypeRepository {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpPrototypeRepository {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    fn prototype_url(&self, id: &str) -> String {
        format!("{}/prototypes/{}", self.base_url, urlencoding::encode(id))
    }
}

#[async_trait]
impl PrototypeRepository for HttpPrototypeRepository {
    async fn get_prototype(&self, id: &str) -> Result<Prototype> {
        let mut request = self
            .client
            .get(self.prototype_url(id))
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to send request to prototype API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Prototype lookup failed with status {}: {}", status, body);
        }

        response
            .json::<Prototype>()
            .await
            .context("Failed to parse prototype response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_url() {
        let repo = HttpPrototypeRepository::new("https://backend.digitalauto.tech/v2/".to_string(), None);
        assert_eq!(
            repo.prototype_url("abc 1"),
            "https://backend.digitalauto.tech/v2/prototypes/abc%201"
        );
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let repo = HttpPrototypeRepository::new("http://localhost".to_string(), Some(String::new()));
        assert!(repo.token.is_none());
    }
}

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{extract_book_content, ContentSource};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};

/// HTTP content source for plain-text editions
#[derive(Clone)]
pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Ok(Self::new(config.http_client()?))
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ContentSource for ContentFetcher {
    async fn fetch_and_clean(&self, resource_url: Option<&str>, title: &str) -> Option<String> {
        let Some(url) = resource_url else {
            debug!(title, "No plain-text resource, skipping content fetch");
            return None;
        };

        match self.fetch_text(url).await {
            Ok(text) => {
                debug!(url, bytes = text.len(), "Fetched book text");
                Some(extract_book_content(title, &text))
            }
            Err(e) => {
                warn!(url, error = %e, "Failed to fetch book content");
                None
            }
        }
    }
}

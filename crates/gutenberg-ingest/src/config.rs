//! Ingestion configuration
//!
//! Settings for the catalog feed, the local data folder, fetch concurrency
//! and the HTTP timeouts/backoff used by the archive download loop. Values
//! come from environment variables (a `.env` file is honoured by the binary)
//! and fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IngestError, Result};

pub const DEFAULT_FEEDS_URL: &str = "https://www.gutenberg.org/cache/epub/feeds";
pub const DEFAULT_ARCHIVE_NAME: &str = "rdf-files.tar.zip";
pub const DEFAULT_EXPAND_DIR: &str = "rdf_files";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_DESCRIPTOR_LIMIT: usize = 100;

/// Relative location of the per-book descriptor directories inside the
/// expanded archive
pub const DESCRIPTOR_ROOT: [&str; 2] = ["cache", "epub"];

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Base URL the catalog archive is published under
    pub feeds_url: String,
    /// Archive file name, both remote and on disk
    pub archive_name: String,
    /// Folder holding the downloaded archive and its expansion
    pub data_dir: PathBuf,
    /// Name of the expansion directory created next to the archive
    pub expand_dir: String,
    /// Maximum number of content fetches in flight
    pub concurrency: usize,
    /// Number of descriptor directories to process per run
    pub descriptor_limit: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Fixed pause between attempts of the outer download loop
    pub download_backoff_secs: u64,
    /// Retries the inner retry policy makes on 5xx responses, after the
    /// first request
    pub retry_max_retries: u32,
    /// Linear backoff step of the inner retry policy
    pub retry_step_secs: u64,
    /// Overall deadline for the archive download (None = wait forever)
    pub download_deadline_secs: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            feeds_url: DEFAULT_FEEDS_URL.to_string(),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            data_dir: PathBuf::from("./data"),
            expand_dir: DEFAULT_EXPAND_DIR.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            descriptor_limit: DEFAULT_DESCRIPTOR_LIMIT,
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
            download_backoff_secs: 5,
            retry_max_retries: 5,
            retry_step_secs: 1,
            download_deadline_secs: None,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            feeds_url: std::env::var("GUTENBERG_FEEDS_URL").unwrap_or(defaults.feeds_url),
            archive_name: std::env::var("GUTENBERG_ARCHIVE_NAME")
                .unwrap_or(defaults.archive_name),
            data_dir: std::env::var("GUTENBERG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            expand_dir: std::env::var("GUTENBERG_EXPAND_DIR").unwrap_or(defaults.expand_dir),
            concurrency: env_or("INGEST_CONCURRENCY", defaults.concurrency),
            descriptor_limit: env_or("INGEST_DESCRIPTOR_LIMIT", defaults.descriptor_limit),
            connect_timeout_secs: env_or(
                "INGEST_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            read_timeout_secs: env_or("INGEST_READ_TIMEOUT_SECS", defaults.read_timeout_secs),
            download_backoff_secs: env_or(
                "INGEST_DOWNLOAD_BACKOFF_SECS",
                defaults.download_backoff_secs,
            ),
            retry_max_retries: env_or("INGEST_RETRY_MAX_RETRIES", defaults.retry_max_retries),
            retry_step_secs: env_or("INGEST_RETRY_STEP_SECS", defaults.retry_step_secs),
            download_deadline_secs: std::env::var("INGEST_DOWNLOAD_DEADLINE_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.feeds_url.trim().is_empty() {
            return Err(IngestError::Config("GUTENBERG_FEEDS_URL must not be empty".into()));
        }
        if self.archive_name.trim().is_empty() || self.archive_name.contains('/') {
            return Err(IngestError::Config(format!(
                "GUTENBERG_ARCHIVE_NAME must be a plain file name, got '{}'",
                self.archive_name
            )));
        }
        if self.expand_dir.trim().is_empty() {
            return Err(IngestError::Config("GUTENBERG_EXPAND_DIR must not be empty".into()));
        }
        if self.concurrency == 0 {
            return Err(IngestError::Config(
                "INGEST_CONCURRENCY must be greater than 0".into(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(IngestError::Config("HTTP timeouts must be greater than 0".into()));
        }
        Ok(())
    }

    /// Remote URL of the catalog archive
    pub fn archive_url(&self) -> String {
        format!("{}/{}", self.feeds_url.trim_end_matches('/'), self.archive_name)
    }

    /// Local path of the downloaded archive
    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(&self.archive_name)
    }

    /// Directory whose numbered subdirectories hold the descriptors
    pub fn descriptor_root(&self) -> PathBuf {
        DESCRIPTOR_ROOT
            .iter()
            .fold(self.data_dir.join(&self.expand_dir), |path, part| path.join(part))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn download_backoff(&self) -> Duration {
        Duration::from_secs(self.download_backoff_secs)
    }

    pub fn download_deadline(&self) -> Option<Duration> {
        self.download_deadline_secs.map(Duration::from_secs)
    }

    /// HTTP client with the configured timeouts
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout())
            .read_timeout(self.read_timeout())
            .user_agent(concat!("gutenberg-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(IngestError::from)
    }
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DbConfig {
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| IngestError::Config("DATABASE_URL not set".to_string()))?;

        Ok(Self {
            url,
            max_connections: env_or("DB_MAX_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT", 30),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.descriptor_limit, 100);
        assert!(config.download_deadline().is_none());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = IngestConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_archive_name_must_be_plain() {
        let config = IngestConfig {
            archive_name: "nested/rdf-files.tar.zip".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_paths() {
        let config = IngestConfig {
            feeds_url: "http://mirror.test/feeds/".into(),
            data_dir: PathBuf::from("/tmp/gb"),
            ..Default::default()
        };

        assert_eq!(
            config.archive_url(),
            "http://mirror.test/feeds/rdf-files.tar.zip"
        );
        assert_eq!(config.archive_path(), PathBuf::from("/tmp/gb/rdf-files.tar.zip"));
        assert_eq!(
            config.descriptor_root(),
            PathBuf::from("/tmp/gb/rdf_files/cache/epub")
        );
    }
}

// Resumable catalog archive download
//
// The archive is a few hundred MB and the upstream mirror drops
// connections regularly, so the download:
// - learns the total size with HEAD
// - resumes from the bytes already on disk with a Range request
// - retries 5xx responses with linear backoff (RetryPolicy)
// - wraps everything in an outer loop without attempt ceiling that only
//   stops on completion, a non-transient error, cancellation or the
//   optional deadline

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};

/// Retry policy for the ranged GET
///
/// Responses with one of `statuses` are retried up to `max_retries` times
/// after the first request (so at most `1 + max_retries` requests),
/// sleeping `step * retry` before each retry. The last response is returned
/// as-is and left to the outer download loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub step: Duration,
    pub statuses: Vec<StatusCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            step: Duration::from_secs(1),
            statuses: vec![
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, status: StatusCode) -> bool {
        self.statuses.contains(&status)
    }

    /// Pause before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        self.step * retry
    }
}

pub struct ArchiveFetcher {
    client: Client,
    policy: RetryPolicy,
    backoff: Duration,
    deadline: Option<Duration>,
    show_progress: bool,
}

impl ArchiveFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            backoff: Duration::from_secs(5),
            deadline: None,
            show_progress: true,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Ok(Self::new(config.http_client()?)
            .with_retry_policy(RetryPolicy {
                max_retries: config.retry_max_retries,
                step: Duration::from_secs(config.retry_step_secs),
                ..RetryPolicy::default()
            })
            .with_backoff(config.download_backoff())
            .with_deadline(config.download_deadline()))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pause between attempts of the outer loop
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Download `source_url` into `destination`, resuming a partial file
    pub async fn fetch(
        &self,
        source_url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match self.deadline {
            Some(deadline) => {
                tokio::time::timeout(deadline, self.fetch_until_complete(source_url, destination, cancel))
                    .await
                    .map_err(|_| {
                        IngestError::Archive(format!(
                            "Download of {} did not complete within {}s",
                            source_url,
                            deadline.as_secs()
                        ))
                    })?
            }
            None => self.fetch_until_complete(source_url, destination, cancel).await,
        }
    }

    async fn fetch_until_complete(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut total: Option<Option<u64>> = None;
        let mut attempt: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            attempt += 1;

            match self.try_fetch(url, destination, &mut total, cancel).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt,
                        error = %e,
                        "Archive download interrupted, retrying in {}s",
                        self.backoff.as_secs_f64()
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch(
        &self,
        url: &str,
        destination: &Path,
        total: &mut Option<Option<u64>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = match *total {
            Some(known) => known,
            None => {
                let size = self.head_size(url).await?;
                *total = Some(size);
                size
            }
        };

        let current = file_size(destination).await?;
        if let Some(total) = total {
            if current >= total {
                info!(path = %destination.display(), bytes = current, "Archive already downloaded");
                return Ok(());
            }
        }

        let response = self.ranged_get(url, current, cancel).await?;
        let append = match response.status() {
            StatusCode::RANGE_NOT_SATISFIABLE => {
                info!(path = %destination.display(), bytes = current, "Server reports nothing left to fetch");
                return Ok(());
            }
            StatusCode::PARTIAL_CONTENT => true,
            status if status.is_success() => {
                if current > 0 {
                    warn!(%status, "Server ignored range request, restarting download from zero");
                }
                false
            }
            status => {
                return Err(IngestError::Status {
                    url: url.to_string(),
                    status,
                })
            }
        };

        let offset = if append { current } else { 0 };
        self.stream_to_file(response, destination, append, offset, total, cancel)
            .await?;

        let written = file_size(destination).await?;
        match total {
            Some(total) if written < total => Err(IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("archive stream ended at {} of {} bytes", written, total),
            ))),
            _ => {
                info!(path = %destination.display(), bytes = written, "Archive download complete");
                Ok(())
            }
        }
    }

    /// Total size from the `Content-Length` of a HEAD response
    async fn head_size(&self, url: &str) -> Result<Option<u64>> {
        let response = self.client.head(url).send().await?;
        let status = response.status();

        if status.is_server_error() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status,
            });
        }
        if !status.is_success() {
            warn!(%status, url, "HEAD request failed, archive size unknown");
            return Ok(None);
        }

        // content_length() reflects the (empty) HEAD body, not the header
        let total = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        debug!(url, ?total, "Archive size from HEAD");
        Ok(total)
    }

    async fn ranged_get(
        &self,
        url: &str,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut retries = 0;
        loop {
            let response = self
                .client
                .get(url)
                .header(RANGE, format!("bytes={}-", offset))
                .send()
                .await?;

            let status = response.status();
            if !self.policy.should_retry(status) || retries >= self.policy.max_retries {
                return Ok(response);
            }

            retries += 1;
            let delay = self.policy.delay(retries);
            debug!(
                %status,
                retry = retries,
                max_retries = self.policy.max_retries,
                "Retrying ranged GET in {:?}",
                delay
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn stream_to_file(
        &self,
        response: Response,
        destination: &Path,
        append: bool,
        offset: u64,
        total: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(destination)
            .await?;

        let progress = self.progress_bar(total, destination);
        progress.set_position(offset);

        let streamed = copy_body(response, &mut file, &progress, cancel).await;

        // keep whatever arrived so the next attempt resumes from it
        let flushed = file.flush().await;
        match &streamed {
            Ok(()) => progress.finish(),
            Err(_) => progress.abandon(),
        }
        streamed?;
        flushed?;
        Ok(())
    }

    fn progress_bar(&self, total: Option<u64>, destination: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        };

        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        bar.set_message(format!("Downloading {}", name));
        bar
    }
}

async fn copy_body(
    response: Response,
    file: &mut tokio::fs::File,
    progress: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut stream = std::pin::pin!(response.bytes_stream());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            chunk = stream.next() => match chunk {
                Some(chunk) => {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    progress.inc(chunk.len() as u64);
                }
                None => return Ok(()),
            },
        }
    }
}

async fn file_size(path: &Path) -> Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

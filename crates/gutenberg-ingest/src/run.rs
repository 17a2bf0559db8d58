// Ingestion run orchestration
//
// Stages, strictly in order:
// 1. make sure the descriptor tree exists (download + expand the archive)
// 2. enumerate and parse up to `descriptor_limit` descriptor directories
// 3. fetch book text for all records (bounded fan-out, joined)
// 4. reconcile records one at a time over the run's catalog session
//
// Per-unit failures are counted in the report; only a fatal store error
// or cancellation ends the run early.

use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::{expander, ArchiveFetcher};
use crate::catalog::Catalog;
use crate::config::IngestConfig;
use crate::content::{ContentFetcher, ContentSource};
use crate::coordinator::{FetchCoordinator, FetchedRecord};
use crate::descriptor::{self, MetadataRecord};
use crate::error::{DescriptorError, IngestError, Result};
use crate::reconcile::ReconciliationEngine;

/// One unit that could not be ingested
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    /// Descriptor path or item id
    pub unit: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Descriptors attempted, whatever the outcome
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub failures: Vec<RunFailure>,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
}

fn as_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

impl RunReport {
    fn record_failure(&mut self, unit: impl Into<String>, reason: impl ToString) {
        self.failed += 1;
        self.failures.push(RunFailure {
            unit: unit.into(),
            reason: reason.to_string(),
        });
    }
}

pub struct IngestionRun {
    config: IngestConfig,
    fetcher: ArchiveFetcher,
    content: Arc<dyn ContentSource>,
    engine: ReconciliationEngine,
}

impl IngestionRun {
    pub fn new(config: IngestConfig, fetcher: ArchiveFetcher, content: Arc<dyn ContentSource>) -> Self {
        Self {
            config,
            fetcher,
            content,
            engine: ReconciliationEngine::new(),
        }
    }

    /// Run wired with the HTTP archive fetcher and content fetcher
    pub fn from_config(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = ArchiveFetcher::from_config(&config)?;
        let content = Arc::new(ContentFetcher::from_config(&config)?);
        Ok(Self::new(config, fetcher, content))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Execute the whole pipeline against `catalog`
    pub async fn execute(
        &self,
        catalog: &mut dyn Catalog,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::default();

        let root = self.config.descriptor_root();
        if !root.is_dir() {
            info!(root = %root.display(), "Descriptor tree missing, acquiring catalog archive");
            self.acquire_archive(cancel).await?;
        }
        if !root.is_dir() {
            return Err(IngestError::Structural(format!(
                "Descriptor root {} not found after expanding the archive",
                root.display()
            )));
        }

        let (records, parse_failures) = self.load_descriptors(root).await?;
        report.processed = records.len() + parse_failures.len();
        for (path, err) in parse_failures {
            report.record_failure(path.display().to_string(), err);
        }
        info!(
            records = records.len(),
            failed = report.failed,
            "Descriptors parsed"
        );

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let coordinator = FetchCoordinator::new(Arc::clone(&self.content), self.config.concurrency);
        let fetched = coordinator.fetch_all(records).await;

        for FetchedRecord { record, content } in fetched {
            if cancel.is_cancelled() {
                report.elapsed = start.elapsed();
                warn!(?report, "Run cancelled during reconciliation");
                return Err(IngestError::Cancelled);
            }

            match self.engine.reconcile(catalog, &record, content).await {
                Ok(outcome) if outcome.created => report.created += 1,
                Ok(outcome) if outcome.updated() => report.updated += 1,
                Ok(_) => report.unchanged += 1,
                Err(e) if e.is_fatal() => {
                    report.record_failure(item_unit(&record), &e);
                    report.elapsed = start.elapsed();
                    error!(
                        error = %e,
                        processed = report.processed,
                        created = report.created,
                        updated = report.updated,
                        failed = report.failed,
                        "Catalog connection lost, aborting run"
                    );
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(external_id = record.external_id, error = %e, "Failed to reconcile record");
                    report.record_failure(item_unit(&record), &e);
                }
            }
        }

        report.elapsed = start.elapsed();
        info!(
            processed = report.processed,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "Ingestion run complete in {:.2}s",
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }

    async fn acquire_archive(&self, cancel: &CancellationToken) -> Result<()> {
        let archive = self.config.archive_path();
        self.fetcher
            .fetch(&self.config.archive_url(), &archive, cancel)
            .await?;

        let expand_dir = self.config.expand_dir.clone();
        tokio::task::spawn_blocking(move || expander::expand(&archive, &expand_dir))
            .await
            .map_err(|e| IngestError::Archive(format!("Expansion task failed: {}", e)))??;
        Ok(())
    }

    async fn load_descriptors(
        &self,
        root: PathBuf,
    ) -> Result<(Vec<MetadataRecord>, Vec<(PathBuf, DescriptorError)>)> {
        let limit = self.config.descriptor_limit;
        tokio::task::spawn_blocking(move || -> Result<_> {
            let mut records = Vec::new();
            let mut failures = Vec::new();
            for path in enumerate_descriptors(&root, limit)? {
                match descriptor::parse_file(&path) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping descriptor");
                        failures.push((path, e));
                    }
                }
            }
            Ok((records, failures))
        })
        .await
        .map_err(|e| IngestError::Structural(format!("Descriptor scan failed: {}", e)))?
    }
}

fn item_unit(record: &MetadataRecord) -> String {
    format!("item {}", record.external_id)
}

/// `*.rdf` files of the first `limit` numbered directories under `root`,
/// in numeric directory order
pub fn enumerate_descriptors(root: &Path, limit: usize) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<(u64, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        match path.file_name().and_then(|n| n.to_str()).and_then(|n| n.parse().ok()) {
            Some(number) => dirs.push((number, path)),
            None => debug!(path = %path.display(), "Skipping non-numeric directory"),
        }
    }
    dirs.sort();

    let mut files = Vec::new();
    for (_, dir) in dirs.into_iter().take(limit) {
        let mut rdf: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "rdf"))
            .collect();
        rdf.sort();
        files.extend(rdf);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "<rdf/>").unwrap();
    }

    #[test]
    fn test_enumerates_numeric_order_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for id in [10, 2, 1] {
            touch(&root.join(format!("{id}/pg{id}.rdf")));
        }
        touch(&root.join("2/README.txt"));
        std::fs::create_dir_all(root.join("DELETE-ME")).unwrap();

        let files = enumerate_descriptors(root, 2).unwrap();

        assert_eq!(files, vec![root.join("1/pg1.rdf"), root.join("2/pg2.rdf")]);
    }

    #[test]
    fn test_report_serializes_elapsed_seconds() {
        let report = RunReport {
            processed: 3,
            created: 2,
            failed: 1,
            failures: vec![RunFailure {
                unit: "item 5".into(),
                reason: "Constraint violation: x".into(),
            }],
            elapsed: Duration::from_millis(1500),
            ..Default::default()
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed_secs"], 1.5);
        assert_eq!(json["failures"][0]["unit"], "item 5");
    }
}

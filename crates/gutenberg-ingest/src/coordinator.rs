// Concurrent content fetch coordinator
//
// Fans the content fetches of a batch out over a bounded number of
// in-flight requests and joins them all before returning. Nothing here
// touches the catalog: reconciliation starts only after fetch_all returns.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::DEFAULT_CONCURRENCY;
use crate::content::ContentSource;
use crate::descriptor::MetadataRecord;

/// A record paired with the content fetched for it
#[derive(Debug, Clone)]
pub struct FetchedRecord {
    pub record: MetadataRecord,
    pub content: Option<String>,
}

pub struct FetchCoordinator {
    source: Arc<dyn ContentSource>,
    limit: usize,
}

impl FetchCoordinator {
    /// `limit` is the maximum number of fetches in flight (at least 1)
    pub fn new(source: Arc<dyn ContentSource>, limit: usize) -> Self {
        Self {
            source,
            limit: limit.max(1),
        }
    }

    pub fn with_default_limit(source: Arc<dyn ContentSource>) -> Self {
        Self::new(source, DEFAULT_CONCURRENCY)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fetch content for every record
    ///
    /// Returns exactly one entry per input record, in input order. A failed
    /// fetch yields `content: None` and does not affect the others.
    pub async fn fetch_all(&self, records: Vec<MetadataRecord>) -> Vec<FetchedRecord> {
        let start = Instant::now();
        let total = records.len();
        let source = &*self.source;

        let mut results: Vec<(usize, FetchedRecord)> = stream::iter(records.into_iter().enumerate())
            .map(|(index, record)| async move {
                let content = source
                    .fetch_and_clean(record.text_resource_url.as_deref(), &record.title)
                    .await;
                (index, FetchedRecord { record, content })
            })
            .buffer_unordered(self.limit)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        let fetched: Vec<FetchedRecord> = results.into_iter().map(|(_, r)| r).collect();

        info!(
            total,
            with_content = fetched.iter().filter(|r| r.content.is_some()).count(),
            concurrency = self.limit,
            "Content fetch complete in {:.2}s",
            start.elapsed().as_secs_f64()
        );

        fetched
    }
}

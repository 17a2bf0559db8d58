// Book text retrieval
//
// Content is best-effort per item: one GET, no retry, and any failure
// leaves the item without content rather than failing the run.

pub mod cleaner;
pub mod fetcher;

use async_trait::async_trait;

pub use cleaner::extract_book_content;
pub use fetcher::ContentFetcher;

/// Source of cleaned book text
///
/// Implementations must never fail: problems are logged and reported as
/// `None`.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_and_clean(&self, resource_url: Option<&str>, title: &str) -> Option<String>;
}

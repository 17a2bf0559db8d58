// Catalog archive acquisition: resumable download and two-layer expansion

pub mod expander;
pub mod fetcher;

pub use expander::expand;
pub use fetcher::{ArchiveFetcher, RetryPolicy};

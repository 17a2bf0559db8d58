//! Gutenberg Ingest Library
//!
//! Ingestion pipeline for the Project Gutenberg RDF catalog feed.
//!
//! # Pipeline
//!
//! - **archive**: resumable download of `rdf-files.tar.zip` and its expansion
//! - **descriptor**: RDF/XML descriptor parsing into [`MetadataRecord`]s
//! - **content**: plain-text retrieval and boilerplate stripping
//! - **coordinator**: bounded concurrent content fetching
//! - **reconcile**: idempotent upsert of authors, categories and items
//! - **catalog**: the store behind reconciliation (PostgreSQL or in-memory)
//! - **run**: the end-to-end orchestration of one ingestion run
//!
//! # Example
//!
//! ```no_run
//! use gutenberg_ingest::catalog::MemoryCatalog;
//! use gutenberg_ingest::{IngestConfig, IngestionRun};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let run = IngestionRun::from_config(IngestConfig::default())?;
//!     let mut catalog = MemoryCatalog::new();
//!     let report = run.execute(&mut catalog, &CancellationToken::new()).await?;
//!     println!("created {} items", report.created);
//!     Ok(())
//! }
//! ```
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod archive;
pub mod catalog;
pub mod config;
pub mod content;
pub mod coordinator;
pub mod descriptor;
pub mod error;
pub mod reconcile;
pub mod run;

pub use config::{DbConfig, IngestConfig};
pub use descriptor::{AuthorStub, MetadataRecord};
pub use error::{DescriptorError, IngestError, Result, StoreError};
pub use reconcile::{Reconciled, ReconciliationEngine};
pub use run::{IngestionRun, RunReport};

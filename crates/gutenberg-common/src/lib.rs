//! Gutenberg Common Library
//!
//! Shared plumbing for the Gutenberg pipeline binaries.
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment
//!   variables or a builder
//!
//! # Example
//!
//! ```no_run
//! use gutenberg_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};

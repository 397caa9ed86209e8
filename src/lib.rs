#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
//! # Durastore
//!
//! A storage provider layer: one asynchronous interface over memory, local
//! filesystem and cloud object stores, with checksum verification on every
//! write and read, a broker that resolves store ids to configured accounts,
//! and a duplication engine that mirrors the primary store to secondary
//! stores.
//!
//! ## Getting Started
//!
//! Describe the storage accounts in `config/<environment>.yaml`:
//!
//! ```yaml
//! storage:
//!   accounts:
//!     - id: "0"
//!       provider: FILESYSTEM
//!       primary: true
//!       options:
//!         root: /var/lib/durastore
//!     - id: "1"
//!       provider: MEMORY
//! duplication:
//!   spaces:
//!     photos: "1"
//! ```
//!
//! and boot a context for the environment in `DURASTORE_ENV`:
//!
//! ```rust,no_run
//! use durastore::{boot, environment::Environment};
//!
//! # fn run() -> durastore::Result<()> {
//! let ctx = boot::create_context(&Environment::from(durastore::environment::resolve_from_env()))?;
//! let primary = ctx.storage.get_storage_provider(None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Available Features
//!
//! | Feature          | Default | Description                           |
//! |------------------|---------|---------------------------------------|
//! | `storage_aws_s3` | false   | Amazon S3 accounts (`AMAZON_S3`).     |
//! | `storage_azure`  | false   | Azure Blob Storage accounts (`AZURE`).|
//! | `storage_gcp`    | false   | Google Cloud Storage accounts (`GCS`).|
//! | `all_storage`    | false   | All of the above.                     |
//! | `testing`        | false   | Test providers and duplicators.       |
pub use self::errors::Error;

pub mod app;
pub mod boot;
pub mod config;
pub mod duplication;
pub mod environment;
pub mod errors;
pub mod logger;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod tests_cfg;

/// Application results options list
pub type Result<T> = std::result::Result<T, Error>;

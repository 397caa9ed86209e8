//! # Storage
//!
//! A uniform asynchronous interface over heterogeneous storage backends.
//!
//! Calls normally go through three layers, each one a [`StorageProvider`]:
//!
//! 1. [`broker::BrokeredStorageProvider`] resolves a store id to its account.
//! 2. [`stateless::StatelessStorageProvider`] verifies checksums, resolves
//!    default mimetypes and waits for new spaces to become visible.
//! 3. A raw driver from [`drivers`] talks to the backend.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use durastore::storage::{
//!     drivers::mem, provider::StorageProvider, stateless::StatelessStorageProvider,
//! };
//!
//! # async fn run() -> durastore::storage::StorageResult<()> {
//! let provider = StatelessStorageProvider::new(Arc::from(mem::new()), Default::default());
//! provider.create_space("photos").await?;
//! let checksum = provider
//!     .add_content("photos", "cat.jpg", Some("image/jpeg"), None, None, None, "meow".into())
//!     .await?;
//! assert_eq!(checksum, "4a4be40c96ac6314e91d93f38043a634");
//! # Ok(())
//! # }
//! ```
pub mod broker;
pub mod checksum;
pub mod drivers;
mod error;
pub mod model;
pub mod provider;
pub mod retry;
pub mod stateless;
pub mod stream;

pub use error::{StorageError, StorageResult};
pub use provider::StorageProvider;

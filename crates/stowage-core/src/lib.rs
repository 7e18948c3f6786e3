//! Multipart upload orchestration for S3-compatible object storage.
//!
//! The pieces, leaves first:
//!
//! - [`client::StorageClient`]: the remote S3 operations, implemented over
//!   the AWS SDK in `stowage-aws` and in memory by [`memory::MemoryStorage`]
//!   (feature `test-utils`).
//! - [`source`]: the three part sources (file slices, pre-chunked bodies,
//!   server-side compose) behind the [`source::PartSource`] trait.
//! - [`multipart::MultipartUploader`]: initiate, upload parts, complete, and
//!   abort-and-verify on any failure.
//! - [`store::ObjectStore`]: the application-facing facade adding
//!   single-request uploads, folder sync, composition shortcuts and CORS
//!   setup.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stowage_core::client::StorageClient;
//! use stowage_core::config::StoreConfig;
//! use stowage_core::store::ObjectStore;
//!
//! # async fn run(client: Arc<dyn StorageClient>) -> Result<(), stowage_core::error::StoreError> {
//! let store = ObjectStore::new(client, StoreConfig::default());
//! let done = store.upload_file("media", "videos/clip.mp4", "/tmp/clip.mp4").await?;
//! println!("uploaded {} with etag {:?}", done.key, done.e_tag);
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod client;
pub mod config;
pub mod cors;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod multipart;
pub mod naming;
pub mod provider;
pub mod source;
pub mod store;

pub use body::RequestBody;
pub use client::{ClientError, StorageClient};
pub use config::StoreConfig;
pub use error::{FailureCause, StoreError, UploadError};
pub use multipart::{AbortOutcome, AbortPolicy, MultipartUploader};
pub use provider::StorageProvider;
pub use store::{ObjectStore, PutOutcome};

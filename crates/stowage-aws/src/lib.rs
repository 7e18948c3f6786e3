//! AWS SDK backend for stowage.
//!
//! [`AwsStorageClient`] implements [`stowage_core::StorageClient`] over
//! `aws-sdk-s3` for any S3-compatible endpoint, and [`Presigner`] issues
//! presigned `GET`/`PUT` URLs through the same client.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stowage_aws::AwsStorageClient;
//! use stowage_core::{ObjectStore, StoreConfig};
//!
//! # async fn run() -> Result<(), stowage_core::StoreError> {
//! let config = StoreConfig::from_env();
//! let client = AwsStorageClient::from_config(&config).await;
//! let store = ObjectStore::new(Arc::new(client), config);
//! store.upload_file("media", "backups/db.tar", "/var/backups/db.tar").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod convert;
mod error;
mod presign;

pub use client::AwsStorageClient;
pub use presign::{PresignedUrl, Presigner};

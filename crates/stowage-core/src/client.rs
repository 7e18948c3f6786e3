//! The remote storage seam.
//!
//! [`StorageClient`] is the set of S3 operations the orchestrator and the
//! [`ObjectStore`](crate::store::ObjectStore) facade need. Transport, signing
//! and endpoint addressing live entirely behind it.

use std::path::Path;

use async_trait::async_trait;
use stowage_model::{
    BucketSummary, CompletedPart, CompletedUpload, CopyObjectResult, CorsRule, DeleteObjectsResult,
    ListPartsPage, ObjectIdentifier, ObjectPage, PutObjectResult,
};

use crate::body::RequestBody;

/// S3 error code reported when an upload ID no longer exists.
pub const NO_SUCH_UPLOAD: &str = "NoSuchUpload";

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a service response (connect, timeout, I/O).
    #[error("{operation} failed: {message}")]
    Transport {
        /// Name of the S3 operation.
        operation: &'static str,
        /// Human-readable cause.
        message: String,
    },

    /// The service answered with an error.
    #[error("{operation} failed with {code}: {message}")]
    Service {
        /// Name of the S3 operation.
        operation: &'static str,
        /// S3 error code (e.g. `NoSuchUpload`, `EntityTooSmall`).
        code: String,
        /// Error message from the service.
        message: String,
    },
}

impl ClientError {
    /// Build a transport error.
    #[must_use]
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
        }
    }

    /// Build a service error.
    #[must_use]
    pub fn service(
        operation: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Service {
            operation,
            code: code.into(),
            message: message.into(),
        }
    }

    /// The S3 error code, if the service answered.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            Self::Transport { .. } => None,
        }
    }

    /// The operation that failed.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Transport { operation, .. } | Self::Service { operation, .. } => operation,
        }
    }

    /// Whether the upload ID is unknown to the service.
    #[must_use]
    pub fn is_no_such_upload(&self) -> bool {
        self.code() == Some(NO_SUCH_UPLOAD)
    }

    /// Whether the target bucket or key does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code(),
            Some("NoSuchKey" | "NoSuchBucket" | "NotFound" | NO_SUCH_UPLOAD)
        )
    }
}

/// Remote S3 operations.
///
/// Each call is one request; none of them retry on their own. Implementations
/// must be safe to share across tasks.
#[async_trait]
pub trait StorageClient: Send + Sync + std::fmt::Debug {
    /// `CreateMultipartUpload`. Returns the upload ID.
    async fn create_multipart_upload(&self, bucket: &str, key: &str)
    -> Result<String, ClientError>;

    /// `UploadPart`. Returns the part's entity tag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: RequestBody,
    ) -> Result<String, ClientError>;

    /// `UploadPartCopy` of a whole source object. Returns the part's entity tag.
    #[allow(clippy::too_many_arguments)]
    async fn upload_part_copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<String, ClientError>;

    /// `CompleteMultipartUpload` with parts in ascending order.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompletedUpload, ClientError>;

    /// `AbortMultipartUpload`.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), ClientError>;

    /// One page of `ListParts`, starting after `part_number_marker`.
    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<u32>,
    ) -> Result<ListPartsPage, ClientError>;

    /// `CopyObject`.
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<CopyObjectResult, ClientError>;

    /// Single-request `PutObject`.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: RequestBody,
        content_type: Option<&str>,
    ) -> Result<PutObjectResult, ClientError>;

    /// `GetObject`, streaming the body into `destination`. Returns bytes written.
    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, ClientError>;

    /// One page of `ListObjectsV2`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage, ClientError>;

    /// `DeleteObjects` for one batch of at most 1000 identifiers.
    ///
    /// Per-key refusals are reported in the result, not as an error.
    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectIdentifier],
    ) -> Result<DeleteObjectsResult, ClientError>;

    /// `ListBuckets`.
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ClientError>;

    /// `HeadBucket`. Returns whether the bucket exists.
    async fn head_bucket(&self, bucket: &str) -> Result<bool, ClientError>;

    /// `CreateBucket`.
    async fn create_bucket(&self, bucket: &str) -> Result<(), ClientError>;

    /// `PutBucketCors`, replacing any existing rules.
    async fn put_bucket_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), ClientError>;

    /// `GetBucketCors`. A bucket without CORS configuration yields no rules.
    async fn get_bucket_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, ClientError>;

    /// `DeleteBucketCors`.
    async fn delete_bucket_cors(&self, bucket: &str) -> Result<(), ClientError>;
}

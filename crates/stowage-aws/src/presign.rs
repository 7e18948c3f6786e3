//! Presigned URLs for direct client access to objects.

use std::time::Duration;

use aws_sdk_s3::presigning::{PresignedRequest, PresigningConfig};
use serde::Serialize;
use stowage_core::ClientError;
use stowage_core::naming::{normalize_bucket, validate_object_key};
use tracing::debug;

use crate::client::AwsStorageClient;
use crate::error::map_sdk_error;

/// A signed request a third party can send without credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    /// The full URL, query signature included.
    pub url: String,
    /// HTTP method the signature covers.
    pub method: String,
    /// Headers the sender must include verbatim.
    pub headers: Vec<(String, String)>,
    /// Lifetime of the signature.
    #[serde(with = "duration_secs")]
    pub expires_in: Duration,
}

impl PresignedUrl {
    fn from_request(request: &PresignedRequest, expires_in: Duration) -> Self {
        Self {
            url: request.uri().to_owned(),
            method: request.method().to_owned(),
            headers: request
                .headers()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
            expires_in,
        }
    }
}

/// Issues presigned `GET` and `PUT` URLs.
#[derive(Debug, Clone)]
pub struct Presigner {
    client: AwsStorageClient,
    default_ttl: Duration,
}

impl Presigner {
    /// Presign through `client`, defaulting to `default_ttl` when a call
    /// gives no lifetime.
    #[must_use]
    pub fn new(client: AwsStorageClient, default_ttl: Duration) -> Self {
        Self {
            client,
            default_ttl,
        }
    }

    /// URL to download `bucket/key`.
    pub async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<PresignedUrl, ClientError> {
        const OP: &str = "GetObject";
        let (bucket, config, ttl) = self.prepare(OP, bucket, key, ttl)?;
        let request = self
            .client
            .client_for(&bucket)
            .get_object()
            .bucket(&bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        debug!(bucket = %bucket, key = %key, ttl_secs = ttl.as_secs(), "GET presigned");
        Ok(PresignedUrl::from_request(&request, ttl))
    }

    /// URL to upload `bucket/key` in one `PUT`, optionally pinning the
    /// content type the uploader must send.
    pub async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<PresignedUrl, ClientError> {
        const OP: &str = "PutObject";
        let (bucket, config, ttl) = self.prepare(OP, bucket, key, ttl)?;
        let request = self
            .client
            .client_for(&bucket)
            .put_object()
            .bucket(&bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_owned))
            .presigned(config)
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        debug!(bucket = %bucket, key = %key, ttl_secs = ttl.as_secs(), "PUT presigned");
        Ok(PresignedUrl::from_request(&request, ttl))
    }

    fn prepare(
        &self,
        operation: &'static str,
        bucket: &str,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<(String, PresigningConfig, Duration), ClientError> {
        let bucket = normalize_bucket(bucket).map_err(|e| invalid_argument(operation, e))?;
        validate_object_key(key).map_err(|e| invalid_argument(operation, e))?;
        let ttl = ttl.unwrap_or(self.default_ttl);
        let config =
            PresigningConfig::expires_in(ttl).map_err(|e| invalid_argument(operation, e))?;
        Ok((bucket, config, ttl))
    }
}

/// Rejected locally, before anything is signed or sent.
fn invalid_argument(operation: &'static str, err: impl std::fmt::Display) -> ClientError {
    ClientError::service(operation, "InvalidArgument", err.to_string())
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

//! Integration tests for stowage against a live S3-compatible server.
//!
//! These tests require a server (MinIO, LocalStack, ...) at `localhost:9000`.
//! They are marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! S3_ENDPOINT_URL=http://localhost:9000 cargo test -p stowage-integration -- --ignored
//! ```

use std::sync::{Arc, Once};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use stowage_aws::AwsStorageClient;
use stowage_core::{ObjectStore, StoreConfig};

static INIT: Once = Once::new();

/// Part size used by the tests; the smallest most servers accept.
pub const PART_SIZE: u64 = 5 * 1024 * 1024;

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:9000".to_owned())
}

fn access_key() -> String {
    std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_owned())
}

fn secret_key() -> String {
    std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_owned())
}

/// Store configuration pointing at the local server.
#[must_use]
pub fn store_config() -> StoreConfig {
    StoreConfig::builder()
        .endpoint(endpoint_url())
        .access_key(access_key())
        .secret_key(secret_key())
        .force_path_style(true)
        .part_size(PART_SIZE)
        .abort_backoff_ms(50)
        .build()
}

/// An [`ObjectStore`] backed by the AWS SDK client.
#[must_use]
pub fn object_store() -> ObjectStore {
    init_tracing();
    let config = store_config();
    let client = AwsStorageClient::with_static_credentials(&config);
    ObjectStore::new(Arc::new(client), config)
}

/// Create a raw S3 client for verifying what the store wrote.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new(access_key(), secret_key(), None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket through the store and return its name. Caller is
/// responsible for cleanup.
pub async fn create_test_bucket(store: &ObjectStore, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    store
        .ensure_bucket(&name)
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Deterministic payload of `len` bytes.
#[must_use]
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_add((i % 251) as u8))
        .collect()
}

/// Read an object back in full.
pub async fn get_bytes(client: &aws_sdk_s3::Client, bucket: &str, key: &str) -> bytes::Bytes {
    client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .unwrap_or_else(|e| panic!("get {bucket}/{key}: {e}"))
        .body
        .collect()
        .await
        .expect("collect body")
        .into_bytes()
}

/// Number of multipart uploads still open in `bucket`.
pub async fn open_uploads(client: &aws_sdk_s3::Client, bucket: &str) -> usize {
    client
        .list_multipart_uploads()
        .bucket(bucket)
        .send()
        .await
        .expect("list_multipart_uploads")
        .uploads()
        .len()
}

/// Delete all objects in a bucket, abort open uploads, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let Ok(resp) = req.send().await else {
            return; // Bucket may not exist.
        };

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    if let Ok(uploads) = client.list_multipart_uploads().bucket(bucket).send().await {
        for upload in uploads.uploads() {
            if let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) {
                let _ = client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(id)
                    .send()
                    .await;
            }
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_abort;
mod test_compose;
mod test_cors;
mod test_folder;
mod test_multipart;

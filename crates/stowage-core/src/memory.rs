//! In-memory [`StorageClient`] with fault injection.
//!
//! [`MemoryStorage`] keeps buckets, objects and in-progress multipart
//! uploads in process memory and follows S3 semantics closely enough to
//! exercise the orchestrator: MD5 entity tags, composite multipart tags,
//! the part-size floor at completion, paged `ListParts`, and `NoSuchUpload`
//! for unknown upload IDs. Every call is recorded, and individual calls can
//! be made to fail.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use md5::{Digest, Md5};
use parking_lot::Mutex;
use stowage_model::limits::{LIST_PARTS_PAGE_SIZE, MIN_PART_SIZE};
use stowage_model::{
    BucketSummary, CompletedPart, CompletedUpload, CompletionOrigin, CopyObjectResult, CorsRule,
    DeleteError, DeleteObjectsResult, ListPartsPage, ObjectIdentifier, ObjectPage, ObjectSummary,
    PartSummary, PutObjectResult,
};

use crate::body::RequestBody;
use crate::client::{ClientError, NO_SUCH_UPLOAD, StorageClient};

// ---------------------------------------------------------------------------
// Entity tags
// ---------------------------------------------------------------------------

/// Quoted hex MD5 of `data`, as S3 reports it for single-part objects.
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

/// Composite multipart entity tag: MD5 of the concatenated binary part
/// digests, formatted as `"<hex>-<count>"`.
#[must_use]
pub fn compute_multipart_etag(part_etags: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_etags.len() * 16);
    for etag in part_etags {
        if let Ok(bytes) = hex::decode(etag.as_ref().trim_matches('"')) {
            combined.extend_from_slice(&bytes);
        }
    }
    format!(
        "\"{}-{}\"",
        hex::encode(Md5::digest(&combined)),
        part_etags.len()
    )
}

// ---------------------------------------------------------------------------
// Recorded calls
// ---------------------------------------------------------------------------

/// A call made against [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `CreateMultipartUpload`.
    CreateMultipartUpload {
        /// Target bucket.
        bucket: String,
        /// Target key.
        key: String,
    },
    /// `UploadPart`.
    UploadPart {
        /// Part number.
        part_number: u32,
        /// Body size.
        size: u64,
    },
    /// `UploadPartCopy`.
    UploadPartCopy {
        /// Copied key.
        source_key: String,
        /// Part number.
        part_number: u32,
    },
    /// `CompleteMultipartUpload`.
    CompleteMultipartUpload {
        /// Part numbers in the order they were sent.
        part_numbers: Vec<u32>,
    },
    /// `AbortMultipartUpload`.
    AbortMultipartUpload,
    /// `ListParts`.
    ListParts {
        /// Marker the page started after.
        marker: Option<u32>,
    },
    /// `CopyObject`.
    CopyObject {
        /// Copied key.
        source_key: String,
    },
    /// `PutObject`.
    PutObject {
        /// Object key.
        key: String,
    },
    /// `GetObject`.
    GetObject {
        /// Object key.
        key: String,
    },
    /// `ListObjectsV2`.
    ListObjects,
    /// `DeleteObjects`.
    DeleteObjects {
        /// Keys in the batch.
        keys: Vec<String>,
    },
    /// `ListBuckets`.
    ListBuckets,
    /// `HeadBucket`.
    HeadBucket,
    /// `CreateBucket`.
    CreateBucket,
    /// `PutBucketCors`.
    PutBucketCors,
    /// `GetBucketCors`.
    GetBucketCors,
    /// `DeleteBucketCors`.
    DeleteBucketCors,
}

impl Call {
    /// S3 operation name of the call.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateMultipartUpload { .. } => "CreateMultipartUpload",
            Self::UploadPart { .. } => "UploadPart",
            Self::UploadPartCopy { .. } => "UploadPartCopy",
            Self::CompleteMultipartUpload { .. } => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
            Self::ListParts { .. } => "ListParts",
            Self::CopyObject { .. } => "CopyObject",
            Self::PutObject { .. } => "PutObject",
            Self::GetObject { .. } => "GetObject",
            Self::ListObjects => "ListObjectsV2",
            Self::DeleteObjects { .. } => "DeleteObjects",
            Self::ListBuckets => "ListBuckets",
            Self::HeadBucket => "HeadBucket",
            Self::CreateBucket => "CreateBucket",
            Self::PutBucketCors => "PutBucketCors",
            Self::GetBucketCors => "GetBucketCors",
            Self::DeleteBucketCors => "DeleteBucketCors",
        }
    }
}

// ---------------------------------------------------------------------------
// Faults
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Faults {
    create: bool,
    parts: Vec<u32>,
    complete: bool,
    abort: bool,
    list_parts: bool,
    /// Keys `DeleteObjects` refuses with `AccessDenied`.
    protected_keys: Vec<String>,
    /// Aborts that leave parts behind, and how many parts they leave.
    sticky_aborts: u32,
    sticky_parts: usize,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    e_tag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct BucketData {
    objects: BTreeMap<String, StoredObject>,
    cors: Vec<CorsRule>,
    created: DateTime<Utc>,
}

impl Default for BucketData {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            cors: Vec::new(),
            created: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredPart {
    data: Bytes,
    e_tag: String,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, StoredPart>,
}

/// In-memory S3 backend for tests.
#[derive(Debug)]
pub struct MemoryStorage {
    buckets: DashMap<String, BucketData>,
    uploads: DashMap<String, PendingUpload>,
    aborted: DashSet<String>,
    next_upload: AtomicU64,
    min_part_size: u64,
    list_page_size: usize,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<Call>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self {
            buckets: DashMap::new(),
            uploads: DashMap::new(),
            aborted: DashSet::new(),
            next_upload: AtomicU64::new(1),
            min_part_size: MIN_PART_SIZE,
            list_page_size: LIST_PARTS_PAGE_SIZE,
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryStorage {
    /// Empty storage with S3 default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty bucket.
    #[must_use]
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.buckets.entry(bucket.to_owned()).or_default();
        self
    }

    /// Override the part-size floor enforced at completion.
    #[must_use]
    pub fn with_min_part_size(mut self, size: u64) -> Self {
        self.min_part_size = size;
        self
    }

    /// Override the number of parts per `ListParts` page.
    #[must_use]
    pub fn with_list_page_size(mut self, size: usize) -> Self {
        self.list_page_size = size.max(1);
        self
    }

    /// Store an object directly, bypassing the call log.
    pub fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let object = StoredObject {
            e_tag: compute_etag(&data),
            data,
            last_modified: Utc::now(),
        };
        self.buckets
            .entry(bucket.to_owned())
            .or_default()
            .objects
            .insert(key.to_owned(), object);
    }

    /// Contents of a stored object.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key).map(|o| o.data.clone()))
    }

    /// Keys stored in `bucket`, in order.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of parts held for an upload, or `None` if it is not pending.
    #[must_use]
    pub fn pending_parts(&self, upload_id: &str) -> Option<usize> {
        self.uploads.get(upload_id).map(|u| u.parts.len())
    }

    /// Number of in-progress uploads.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    /// Every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of calls of one S3 operation.
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Make `CreateMultipartUpload` fail.
    pub fn fail_create(&self) {
        self.faults.lock().create = true;
    }

    /// Make uploading (or copying) part `part_number` fail with a transport error.
    pub fn fail_part(&self, part_number: u32) {
        self.faults.lock().parts.push(part_number);
    }

    /// Make `CompleteMultipartUpload` fail.
    pub fn fail_complete(&self) {
        self.faults.lock().complete = true;
    }

    /// Make `AbortMultipartUpload` fail with a transport error.
    pub fn fail_abort(&self) {
        self.faults.lock().abort = true;
    }

    /// Make `ListParts` fail with a transport error.
    pub fn fail_list_parts(&self) {
        self.faults.lock().list_parts = true;
    }

    /// Make `DeleteObjects` refuse `key` with `AccessDenied`.
    pub fn protect_key(&self, key: impl Into<String>) {
        self.faults.lock().protected_keys.push(key.into());
    }

    /// Let the next `aborts` abort calls succeed while leaving `parts` parts
    /// listed, as a backend with lagging part cleanup does.
    pub fn leave_parts_after_abort(&self, aborts: u32, parts: usize) {
        let mut faults = self.faults.lock();
        faults.sticky_aborts = aborts;
        faults.sticky_parts = parts;
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn no_such_bucket(operation: &'static str, bucket: &str) -> ClientError {
        ClientError::service(
            operation,
            "NoSuchBucket",
            format!("The specified bucket does not exist: {bucket}"),
        )
    }

    fn no_such_upload(operation: &'static str, upload_id: &str) -> ClientError {
        ClientError::service(
            operation,
            NO_SUCH_UPLOAD,
            format!("The specified upload does not exist: {upload_id}"),
        )
    }

    fn check_upload(
        &self,
        operation: &'static str,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), ClientError> {
        match self.uploads.get(upload_id) {
            Some(u) if u.bucket == bucket && u.key == key => Ok(()),
            _ => Err(Self::no_such_upload(operation, upload_id)),
        }
    }

    fn store_part(&self, upload_id: &str, part_number: u32, data: Bytes) -> Option<String> {
        let e_tag = compute_etag(&data);
        let mut upload = self.uploads.get_mut(upload_id)?;
        upload.parts.insert(
            part_number,
            StoredPart {
                data,
                e_tag: e_tag.clone(),
            },
        );
        Some(e_tag)
    }

    fn part_fault(&self, operation: &'static str, part_number: u32) -> Result<(), ClientError> {
        if self.faults.lock().parts.contains(&part_number) {
            return Err(ClientError::transport(
                operation,
                format!("connection reset while sending part {part_number}"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, ClientError> {
        self.record(Call::CreateMultipartUpload {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        });
        if self.faults.lock().create {
            return Err(ClientError::transport(
                "CreateMultipartUpload",
                "connection refused",
            ));
        }
        if !self.buckets.contains_key(bucket) {
            return Err(Self::no_such_bucket("CreateMultipartUpload", bucket));
        }
        let upload_id = format!(
            "upload-{}",
            self.next_upload.fetch_add(1, Ordering::Relaxed)
        );
        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: RequestBody,
    ) -> Result<String, ClientError> {
        let data = body
            .into_bytes()
            .await
            .map_err(|e| ClientError::transport("UploadPart", e.to_string()))?;
        self.record(Call::UploadPart {
            part_number,
            size: data.len() as u64,
        });
        self.part_fault("UploadPart", part_number)?;
        self.check_upload("UploadPart", bucket, key, upload_id)?;
        self.store_part(upload_id, part_number, data)
            .ok_or_else(|| Self::no_such_upload("UploadPart", upload_id))
    }

    async fn upload_part_copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<String, ClientError> {
        self.record(Call::UploadPartCopy {
            source_key: source_key.to_owned(),
            part_number,
        });
        self.part_fault("UploadPartCopy", part_number)?;
        self.check_upload("UploadPartCopy", bucket, key, upload_id)?;
        let data = self.object(source_bucket, source_key).ok_or_else(|| {
            ClientError::service(
                "UploadPartCopy",
                "NoSuchKey",
                format!("The specified key does not exist: {source_key}"),
            )
        })?;
        self.store_part(upload_id, part_number, data)
            .ok_or_else(|| Self::no_such_upload("UploadPartCopy", upload_id))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompletedUpload, ClientError> {
        const OP: &str = "CompleteMultipartUpload";
        self.record(Call::CompleteMultipartUpload {
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });
        if self.faults.lock().complete {
            return Err(ClientError::service(OP, "InternalError", "injected failure"));
        }
        self.check_upload(OP, bucket, key, upload_id)?;

        let mut data = Vec::new();
        let mut etags = Vec::with_capacity(parts.len());
        {
            let upload = self
                .uploads
                .get(upload_id)
                .ok_or_else(|| Self::no_such_upload(OP, upload_id))?;
            let mut previous = 0;
            for (index, part) in parts.iter().enumerate() {
                if part.part_number <= previous {
                    return Err(ClientError::service(
                        OP,
                        "InvalidPartOrder",
                        "The list of parts was not in ascending order",
                    ));
                }
                previous = part.part_number;
                let stored = upload
                    .parts
                    .get(&part.part_number)
                    .filter(|p| p.e_tag == part.e_tag)
                    .ok_or_else(|| {
                        ClientError::service(
                            OP,
                            "InvalidPart",
                            format!("Part {} could not be found", part.part_number),
                        )
                    })?;
                if index + 1 < parts.len() && (stored.data.len() as u64) < self.min_part_size {
                    return Err(ClientError::service(
                        OP,
                        "EntityTooSmall",
                        "Your proposed upload is smaller than the minimum allowed object size",
                    ));
                }
                data.extend_from_slice(&stored.data);
                etags.push(stored.e_tag.clone());
            }
        }

        self.uploads.remove(upload_id);
        let e_tag = compute_multipart_etag(&etags);
        self.buckets.entry(bucket.to_owned()).or_default().objects.insert(
            key.to_owned(),
            StoredObject {
                data: Bytes::from(data),
                e_tag: e_tag.clone(),
                last_modified: Utc::now(),
            },
        );

        Ok(CompletedUpload {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            e_tag: Some(e_tag),
            version_id: None,
            location: Some(format!("memory://{bucket}/{key}")),
            expiration: None,
            server_side_encryption: None,
            origin: CompletionOrigin::Multipart {
                upload_id: upload_id.to_owned(),
                parts: parts.len(),
            },
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), ClientError> {
        self.record(Call::AbortMultipartUpload);
        let sticky = {
            let mut faults = self.faults.lock();
            if faults.abort {
                return Err(ClientError::transport(
                    "AbortMultipartUpload",
                    "operation timed out",
                ));
            }
            if faults.sticky_aborts > 0 {
                faults.sticky_aborts -= 1;
                Some(faults.sticky_parts)
            } else {
                None
            }
        };

        if self.aborted.contains(upload_id) {
            return Ok(());
        }
        self.check_upload("AbortMultipartUpload", bucket, key, upload_id)?;

        match sticky {
            Some(keep) => {
                if let Some(mut upload) = self.uploads.get_mut(upload_id) {
                    let doomed: Vec<u32> = upload.parts.keys().skip(keep).copied().collect();
                    for n in doomed {
                        upload.parts.remove(&n);
                    }
                }
            }
            None => {
                self.uploads.remove(upload_id);
                self.aborted.insert(upload_id.to_owned());
            }
        }
        Ok(())
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<u32>,
    ) -> Result<ListPartsPage, ClientError> {
        self.record(Call::ListParts {
            marker: part_number_marker,
        });
        if self.faults.lock().list_parts {
            return Err(ClientError::transport("ListParts", "connection reset"));
        }
        if self.aborted.contains(upload_id) {
            return Ok(ListPartsPage::default());
        }
        self.check_upload("ListParts", bucket, key, upload_id)?;

        let upload = self
            .uploads
            .get(upload_id)
            .ok_or_else(|| Self::no_such_upload("ListParts", upload_id))?;
        let after = part_number_marker.unwrap_or(0);
        let mut remaining = upload.parts.range(after.saturating_add(1)..).peekable();
        let mut parts = Vec::new();
        while parts.len() < self.list_page_size {
            let Some((n, part)) = remaining.next() else {
                break;
            };
            parts.push(PartSummary {
                part_number: *n,
                e_tag: part.e_tag.clone(),
                size: part.data.len() as u64,
            });
        }
        let is_truncated = remaining.peek().is_some();
        Ok(ListPartsPage {
            next_part_number_marker: if is_truncated {
                parts.last().map(|p| p.part_number)
            } else {
                None
            },
            parts,
            is_truncated,
        })
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<CopyObjectResult, ClientError> {
        self.record(Call::CopyObject {
            source_key: source_key.to_owned(),
        });
        let data = self.object(source_bucket, source_key).ok_or_else(|| {
            ClientError::service(
                "CopyObject",
                "NoSuchKey",
                format!("The specified key does not exist: {source_key}"),
            )
        })?;
        if !self.buckets.contains_key(bucket) {
            return Err(Self::no_such_bucket("CopyObject", bucket));
        }
        self.insert_object(bucket, key, data.clone());
        Ok(CopyObjectResult {
            e_tag: Some(compute_etag(&data)),
            last_modified: Some(Utc::now()),
            ..CopyObjectResult::default()
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: RequestBody,
        _content_type: Option<&str>,
    ) -> Result<PutObjectResult, ClientError> {
        self.record(Call::PutObject {
            key: key.to_owned(),
        });
        if !self.buckets.contains_key(bucket) {
            return Err(Self::no_such_bucket("PutObject", bucket));
        }
        let data = body
            .into_bytes()
            .await
            .map_err(|e| ClientError::transport("PutObject", e.to_string()))?;
        let e_tag = compute_etag(&data);
        self.insert_object(bucket, key, data);
        Ok(PutObjectResult {
            e_tag: Some(e_tag),
            version_id: None,
        })
    }

    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, ClientError> {
        self.record(Call::GetObject {
            key: key.to_owned(),
        });
        let data = self.object(bucket, key).ok_or_else(|| {
            ClientError::service(
                "GetObject",
                "NoSuchKey",
                format!("The specified key does not exist: {key}"),
            )
        })?;
        tokio::fs::write(destination, &data)
            .await
            .map_err(|e| ClientError::transport("GetObject", e.to_string()))?;
        Ok(data.len() as u64)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        _continuation_token: Option<&str>,
    ) -> Result<ObjectPage, ClientError> {
        self.record(Call::ListObjects);
        let data = self
            .buckets
            .get(bucket)
            .ok_or_else(|| Self::no_such_bucket("ListObjectsV2", bucket))?;
        let objects = data
            .objects
            .iter()
            .filter(|(k, _)| prefix.is_none_or(|p| k.starts_with(p)))
            .map(|(k, o)| ObjectSummary {
                key: k.clone(),
                size: o.data.len() as u64,
                e_tag: Some(o.e_tag.clone()),
                last_modified: Some(o.last_modified),
            })
            .collect();
        Ok(ObjectPage {
            objects,
            next_continuation_token: None,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectIdentifier],
    ) -> Result<DeleteObjectsResult, ClientError> {
        self.record(Call::DeleteObjects {
            keys: objects.iter().map(|o| o.key.clone()).collect(),
        });
        let protected = self.faults.lock().protected_keys.clone();
        let mut data = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket("DeleteObjects", bucket))?;

        let mut result = DeleteObjectsResult::default();
        for object in objects {
            if protected.contains(&object.key) {
                result.errors.push(DeleteError {
                    key: object.key.clone(),
                    version_id: object.version_id.clone(),
                    code: "AccessDenied".to_owned(),
                    message: "Access Denied".to_owned(),
                });
                continue;
            }
            // Absent keys are reported as deleted.
            data.objects.remove(&object.key);
            result.deleted.push(object.clone());
        }
        Ok(result)
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ClientError> {
        self.record(Call::ListBuckets);
        let mut buckets: Vec<BucketSummary> = self
            .buckets
            .iter()
            .map(|entry| BucketSummary {
                name: entry.key().clone(),
                creation_date: Some(entry.created),
            })
            .collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn head_bucket(&self, bucket: &str) -> Result<bool, ClientError> {
        self.record(Call::HeadBucket);
        Ok(self.buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ClientError> {
        self.record(Call::CreateBucket);
        if self.buckets.contains_key(bucket) {
            return Err(ClientError::service(
                "CreateBucket",
                "BucketAlreadyOwnedByYou",
                format!("Bucket already exists: {bucket}"),
            ));
        }
        self.buckets.insert(bucket.to_owned(), BucketData::default());
        Ok(())
    }

    async fn put_bucket_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), ClientError> {
        self.record(Call::PutBucketCors);
        let mut data = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket("PutBucketCors", bucket))?;
        data.cors = rules.to_vec();
        Ok(())
    }

    async fn get_bucket_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, ClientError> {
        self.record(Call::GetBucketCors);
        self.buckets
            .get(bucket)
            .map(|b| b.cors.clone())
            .ok_or_else(|| Self::no_such_bucket("GetBucketCors", bucket))
    }

    async fn delete_bucket_cors(&self, bucket: &str) -> Result<(), ClientError> {
        self.record(Call::DeleteBucketCors);
        let mut data = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_such_bucket("DeleteBucketCors", bucket))?;
        data.cors.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_compute_md5_etag() {
        assert_eq!(compute_etag(b""), "\"d41d8cd98f00b204e9800998ecf8427e\"");
    }

    #[test]
    fn test_should_compute_multipart_etag_suffix() {
        let etag = compute_multipart_etag(&[compute_etag(b"a"), compute_etag(b"b")]);
        assert!(etag.ends_with("-2\""));
    }

    #[tokio::test]
    async fn test_should_page_list_parts() {
        let storage = MemoryStorage::new()
            .with_bucket("b")
            .with_list_page_size(2);
        let id = storage.create_multipart_upload("b", "k").await.expect("create");
        for n in 1..=3 {
            storage
                .upload_part("b", "k", &id, n, RequestBody::from_bytes(vec![0u8; 4]))
                .await
                .expect("upload part");
        }

        let first = storage.list_parts("b", "k", &id, None).await.expect("page 1");
        assert_eq!(first.parts.len(), 2);
        assert!(first.is_truncated);
        assert_eq!(first.next_part_number_marker, Some(2));

        let second = storage
            .list_parts("b", "k", &id, first.next_part_number_marker)
            .await
            .expect("page 2");
        assert_eq!(second.parts.len(), 1);
        assert!(!second.is_truncated);
    }

    #[tokio::test]
    async fn test_should_reject_small_non_last_part_on_complete() {
        let storage = MemoryStorage::new().with_bucket("b").with_min_part_size(8);
        let id = storage.create_multipart_upload("b", "k").await.expect("create");
        let mut parts = Vec::new();
        for n in 1..=2 {
            let e_tag = storage
                .upload_part("b", "k", &id, n, RequestBody::from_bytes(vec![1u8; 4]))
                .await
                .expect("upload part");
            parts.push(CompletedPart::new(n, e_tag));
        }
        let err = storage
            .complete_multipart_upload("b", "k", &id, &parts)
            .await
            .expect_err("4-byte first part is too small");
        assert_eq!(err.code(), Some("EntityTooSmall"));
    }

    #[tokio::test]
    async fn test_should_report_unknown_upload() {
        let storage = MemoryStorage::new().with_bucket("b");
        let err = storage
            .list_parts("b", "k", "missing", None)
            .await
            .expect_err("unknown upload");
        assert!(err.is_no_such_upload());
    }

    #[tokio::test]
    async fn test_should_delete_objects_and_report_refusals() {
        let storage = MemoryStorage::new().with_bucket("b");
        storage.insert_object("b", "keep", vec![1u8]);
        storage.insert_object("b", "drop", vec![2u8]);
        storage.insert_object("b", "locked", vec![3u8]);
        storage.protect_key("locked");

        let batch = [
            ObjectIdentifier::new("drop"),
            ObjectIdentifier::new("never-existed"),
            ObjectIdentifier::versioned("locked", "v1"),
        ];
        let result = storage.delete_objects("b", &batch).await.expect("delete");

        assert_eq!(result.deleted, batch[..2].to_vec());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "AccessDenied");
        assert_eq!(result.errors[0].version_id.as_deref(), Some("v1"));
        assert_eq!(storage.keys("b"), vec!["keep", "locked"]);
    }

    #[tokio::test]
    async fn test_should_list_buckets_by_name() {
        let storage = MemoryStorage::new().with_bucket("zeta").with_bucket("alpha");
        let buckets = storage.list_buckets().await.expect("list");
        let names: Vec<_> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert!(buckets.iter().all(|b| b.creation_date.is_some()));
    }

    #[tokio::test]
    async fn test_should_clear_bucket_cors() {
        let storage = MemoryStorage::new().with_bucket("b");
        storage
            .put_bucket_cors("b", &[CorsRule::default()])
            .await
            .expect("put cors");
        storage.delete_bucket_cors("b").await.expect("delete cors");
        assert!(storage.get_bucket_cors("b").await.expect("get").is_empty());

        let err = storage
            .delete_bucket_cors("missing")
            .await
            .expect_err("no bucket");
        assert_eq!(err.code(), Some("NoSuchBucket"));
    }
}

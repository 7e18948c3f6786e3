//! Application-facing object store.
//!
//! [`ObjectStore`] wraps a [`StorageClient`] and a [`MultipartUploader`] and
//! adds the operations applications actually call: upload a file (single
//! `PutObject` or multipart depending on size), compose objects, sync a local
//! folder up or down, and configure bucket CORS.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use stowage_model::{
    BucketSummary, CompletedUpload, CopyObjectResult, CorsRule, DeleteObjectsResult,
    ObjectIdentifier, ObjectSummary, PartSummary, PutObjectResult, UploadSession,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::body::RequestBody;
use crate::client::{ClientError, StorageClient};
use crate::config::StoreConfig;
use crate::cors::{default_cors_rules, parse_cors_json, parse_cors_xml};
use crate::error::StoreError;
use crate::multipart::{AbortOutcome, MultipartUploader};
use crate::naming::{
    normalize_bucket, upload_object_name, upload_prefix, validate_bucket_name, validate_object_key,
};
use crate::source::{BodyList, ComposeSource, FileSlices, PartLimits};

/// Most identifiers S3 accepts in one `DeleteObjects` request.
pub const DELETE_BATCH_SIZE: usize = 1_000;

/// Result of [`ObjectStore::put_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The file was sent in one `PutObject` request.
    Single {
        /// Destination bucket.
        bucket: String,
        /// Destination key.
        key: String,
        /// The `PutObject` response.
        result: PutObjectResult,
    },
    /// The file was sent as a multipart upload.
    Multipart(CompletedUpload),
}

impl PutOutcome {
    /// Destination key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Single { key, .. } => key,
            Self::Multipart(done) => &done.key,
        }
    }

    /// ETag of the stored object, if the service returned one.
    #[must_use]
    pub fn e_tag(&self) -> Option<&str> {
        match self {
            Self::Single { result, .. } => result.e_tag.as_deref(),
            Self::Multipart(done) => done.e_tag.as_deref(),
        }
    }

    /// Whether the multipart path was taken.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

/// High-level operations over one S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    uploader: MultipartUploader,
    config: StoreConfig,
}

impl ObjectStore {
    /// Create a store over `client`, deriving limits and abort policy from
    /// `config`.
    #[must_use]
    pub fn new(client: Arc<dyn StorageClient>, config: StoreConfig) -> Self {
        let uploader = MultipartUploader::new(client)
            .with_limits(config.part_limits())
            .with_abort_policy(config.abort_policy());
        Self { uploader, config }
    }

    /// Abort in-flight uploads once `cancel` turns `true`.
    #[must_use]
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.uploader = self.uploader.with_cancel(cancel);
        self
    }

    /// Override the part limits used to validate sources.
    #[must_use]
    pub fn with_part_limits(mut self, limits: PartLimits) -> Self {
        self.uploader = self.uploader.with_limits(limits);
        self
    }

    /// The configuration this store was built with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The multipart uploader.
    #[must_use]
    pub fn uploader(&self) -> &MultipartUploader {
        &self.uploader
    }

    fn client(&self) -> &dyn StorageClient {
        self.uploader.client().as_ref()
    }

    /// The configured default bucket, normalized.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if no default bucket is set.
    pub fn default_bucket(&self) -> Result<String, StoreError> {
        if self.config.default_bucket.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "no bucket given and no default bucket configured".to_owned(),
            ));
        }
        Ok(normalize_bucket(&self.config.default_bucket)?)
    }

    /// Generate a unique key for `name` under the configured base directory.
    #[must_use]
    pub fn object_name(&self, name: &str) -> String {
        upload_object_name(name, &self.config.upload_base_dir)
    }

    /// Public URL of `key` on the configured domain.
    ///
    /// Returns `None` when no domain is configured or objects are private.
    #[must_use]
    pub fn public_url(&self, key: &str) -> Option<String> {
        let domain = self.config.domain.trim_end_matches('/');
        if domain.is_empty() || self.config.private {
            return None;
        }
        Some(format!("{domain}/{}", key.trim_start_matches('/')))
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Upload a local file with multipart, using the configured part size.
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
    ) -> Result<CompletedUpload, StoreError> {
        self.upload_file_with_part_size(bucket, key, path, self.config.part_size)
            .await
    }

    /// Upload a local file with multipart, slicing it into `part_size` parts.
    pub async fn upload_file_with_part_size(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
        part_size: u64,
    ) -> Result<CompletedUpload, StoreError> {
        let source = FileSlices::with_part_size(path.as_ref(), part_size);
        Ok(self.uploader.upload(bucket, key, source).await?)
    }

    /// Upload pre-chunked bodies as consecutive parts.
    pub async fn upload_bodies(
        &self,
        bucket: &str,
        key: &str,
        bodies: Vec<RequestBody>,
    ) -> Result<CompletedUpload, StoreError> {
        Ok(self
            .uploader
            .upload(bucket, key, BodyList::new(bodies))
            .await?)
    }

    /// Upload a local file in one `PutObject` below the multipart threshold,
    /// and with multipart at or above it.
    pub async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
    ) -> Result<PutOutcome, StoreError> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| StoreError::io(path, e))?
            .len();

        if size >= self.config.multipart_threshold {
            return Ok(PutOutcome::Multipart(
                self.upload_file(bucket, key, path).await?,
            ));
        }

        let bucket = normalize_bucket(bucket)?;
        validate_object_key(key)?;
        let result = self
            .client()
            .put_object(&bucket, key, RequestBody::from_path(path), None)
            .await?;
        debug!(bucket = %bucket, key = %key, size, "object uploaded");
        Ok(PutOutcome::Single {
            bucket,
            key: key.to_owned(),
            result,
        })
    }

    // -----------------------------------------------------------------------
    // Compose and copy
    // -----------------------------------------------------------------------

    /// Merge `keys` of `source_bucket` into `bucket/key`.
    ///
    /// Keys are ordered by their last path segment parsed as a part number.
    /// A single key is copied with `CopyObject` instead, whatever its name.
    pub async fn compose_objects<I, K>(
        &self,
        source_bucket: &str,
        keys: I,
        bucket: &str,
        key: &str,
    ) -> Result<CompletedUpload, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.len() == 1 {
            let source_key = keys.remove(0);
            return self.copy_as_upload(source_bucket, &source_key, bucket, key).await;
        }
        let source = ComposeSource::from_keys(normalize_bucket(source_bucket)?, keys)?;
        self.compose(source, bucket, key).await
    }

    /// Merge every object under `prefix` of `source_bucket` into `bucket/key`.
    pub async fn compose_prefix(
        &self,
        source_bucket: &str,
        prefix: Option<&str>,
        bucket: &str,
        key: &str,
    ) -> Result<CompletedUpload, StoreError> {
        let source_bucket = normalize_bucket(source_bucket)?;
        let objects: Vec<ObjectSummary> = self
            .list_all_objects(&source_bucket, prefix)
            .await?
            .into_iter()
            .filter(|o| !o.key.ends_with('/'))
            .collect();

        match objects.as_slice() {
            [] => Err(StoreError::InvalidArgument(format!(
                "no objects to compose in {source_bucket}/{}",
                prefix.unwrap_or_default()
            ))),
            [single] => {
                self.copy_as_upload(&source_bucket, &single.key, bucket, key)
                    .await
            }
            _ => {
                let source = ComposeSource::from_objects(source_bucket, objects)?;
                self.compose(source, bucket, key).await
            }
        }
    }

    /// Run a prepared [`ComposeSource`], copying directly when it holds a
    /// single object.
    pub async fn compose(
        &self,
        source: ComposeSource,
        bucket: &str,
        key: &str,
    ) -> Result<CompletedUpload, StoreError> {
        if let Some(source_key) = source.single_source() {
            return self
                .copy_as_upload(source.source_bucket(), source_key, bucket, key)
                .await;
        }
        Ok(self.uploader.upload(bucket, key, source).await?)
    }

    /// Server-side copy of one object.
    pub async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<CopyObjectResult, StoreError> {
        let source_bucket = normalize_bucket(source_bucket)?;
        let bucket = normalize_bucket(bucket)?;
        validate_object_key(source_key)?;
        validate_object_key(key)?;
        Ok(self
            .client()
            .copy_object(&source_bucket, source_key, &bucket, key)
            .await?)
    }

    async fn copy_as_upload(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<CompletedUpload, StoreError> {
        let copy = self
            .copy_object(source_bucket, source_key, bucket, key)
            .await?;
        let bucket = normalize_bucket(bucket)?;
        info!(
            bucket = %bucket,
            key = %key,
            source_key = %source_key,
            "single source composed with CopyObject"
        );
        Ok(CompletedUpload::from_copy(bucket, key, copy))
    }

    // -----------------------------------------------------------------------
    // Session maintenance
    // -----------------------------------------------------------------------

    /// Abort an upload by id and verify no parts remain.
    pub async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<AbortOutcome, StoreError> {
        let session = UploadSession::new(normalize_bucket(bucket)?, key, upload_id);
        Ok(self.uploader.abort_and_verify(&session).await)
    }

    /// Every part currently held for an upload.
    pub async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<PartSummary>, StoreError> {
        let session = UploadSession::new(normalize_bucket(bucket)?, key, upload_id);
        Ok(self.uploader.list_all_parts(&session).await?)
    }

    /// Every object under `prefix`, following continuation tokens.
    pub async fn list_all_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectSummary>, StoreError> {
        let bucket = normalize_bucket(bucket)?;
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .client()
                .list_objects(&bucket, prefix, token.as_deref())
                .await?;
            objects.extend(page.objects);
            match page.next_continuation_token {
                None => return Ok(objects),
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    return Err(ClientError::transport(
                        "ListObjectsV2",
                        "continuation token did not advance",
                    )
                    .into());
                }
                Some(next) => token = Some(next),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Folders
    // -----------------------------------------------------------------------

    /// Upload every file under `folder`, keeping its relative layout.
    ///
    /// Keys are `{prefix}/{folder name}/{relative path}` where `prefix` is a
    /// fresh [`upload_prefix`]. Files below the multipart threshold go out in
    /// one request. A plain file is uploaded as `{prefix}/{file name}`.
    pub async fn upload_folder(
        &self,
        bucket: &str,
        folder: impl AsRef<Path>,
    ) -> Result<Vec<PutOutcome>, StoreError> {
        let folder = folder.as_ref();
        let bucket = normalize_bucket(bucket)?;
        let meta = tokio::fs::metadata(folder)
            .await
            .map_err(|e| StoreError::io(folder, e))?;
        let root_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StoreError::InvalidArgument(format!("{} has no file name", folder.display()))
            })?;
        let prefix = upload_prefix(&self.config.upload_base_dir, Utc::now());

        let files = if meta.is_file() {
            vec![(folder.to_path_buf(), root_name)]
        } else {
            walk_files(folder)
                .await?
                .into_iter()
                .map(|(path, rel)| {
                    let rel = format!("{root_name}/{rel}");
                    (path, rel)
                })
                .collect()
        };

        let mut uploaded = Vec::with_capacity(files.len());
        for (path, rel) in files {
            let key = format!("{prefix}/{rel}");
            let outcome = self.put_file(&bucket, &key, &path).await?;
            info!(
                bucket = %bucket,
                key = %key,
                multipart = outcome.is_multipart(),
                "file uploaded"
            );
            uploaded.push(outcome);
        }
        Ok(uploaded)
    }

    /// Download every object under `prefix` into `destination`.
    ///
    /// The part of `prefix` up to its last `/` is stripped from each key, so
    /// `a/b/c` downloads `a/b/c/x.txt` to `destination/c/x.txt`. Returns the
    /// local paths written.
    pub async fn download_folder(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        destination: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let destination = destination.as_ref();
        let bucket = normalize_bucket(bucket)?;
        let prefix = prefix.map(|p| p.replace('\\', "/")).filter(|p| !p.is_empty());
        let objects = self.list_all_objects(&bucket, prefix.as_deref()).await?;
        if objects.is_empty() {
            info!(bucket = %bucket, prefix = ?prefix, "nothing to download");
            return Ok(Vec::new());
        }

        let parent = prefix
            .as_deref()
            .and_then(|p| p.rfind('/').map(|i| &p[..i]))
            .unwrap_or_default();

        let mut written = Vec::with_capacity(objects.len());
        for object in objects {
            if object.key.ends_with('/') {
                continue;
            }
            let relative = object.key.strip_prefix(parent).unwrap_or(&object.key);
            let target = destination.join(safe_relative_path(relative)?);
            self.download_file(&bucket, &object.key, &target).await?;
            written.push(target);
        }
        Ok(written)
    }

    /// Download one object to `destination`, creating missing parent
    /// directories. Returns the bytes written.
    pub async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        destination: impl AsRef<Path>,
    ) -> Result<u64, StoreError> {
        let destination = destination.as_ref();
        let bucket = normalize_bucket(bucket)?;
        validate_object_key(key)?;
        if let Some(dir) = destination.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }
        let size = self
            .client()
            .download_object(&bucket, key, destination)
            .await?;
        info!(
            bucket = %bucket,
            key = %key,
            path = %destination.display(),
            size,
            "object downloaded"
        );
        Ok(size)
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    /// Delete the current version of every key, in batches of
    /// [`DELETE_BATCH_SIZE`].
    ///
    /// Keys the service refuses are listed in the result's `errors`.
    pub async fn delete_objects<I, K>(
        &self,
        bucket: &str,
        keys: I,
    ) -> Result<DeleteObjectsResult, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let objects: Vec<ObjectIdentifier> =
            keys.into_iter().map(ObjectIdentifier::new).collect();
        self.delete_versions(bucket, &objects).await
    }

    /// Delete specific object versions, in batches of [`DELETE_BATCH_SIZE`].
    pub async fn delete_versions(
        &self,
        bucket: &str,
        objects: &[ObjectIdentifier],
    ) -> Result<DeleteObjectsResult, StoreError> {
        let bucket = normalize_bucket(bucket)?;
        let mut result = DeleteObjectsResult::default();
        for batch in objects.chunks(DELETE_BATCH_SIZE) {
            let page = self.client().delete_objects(&bucket, batch).await?;
            result.deleted.extend(page.deleted);
            result.errors.extend(page.errors);
        }
        if result.is_complete() {
            info!(bucket = %bucket, deleted = result.deleted.len(), "objects deleted");
        } else {
            warn!(
                bucket = %bucket,
                deleted = result.deleted.len(),
                refused = result.errors.len(),
                "some objects were not deleted"
            );
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Buckets and CORS
    // -----------------------------------------------------------------------

    /// Every bucket owned by the configured credentials.
    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>, StoreError> {
        Ok(self.client().list_buckets().await?)
    }

    /// The bucket called `name`, if it is listed.
    pub async fn find_bucket(&self, name: &str) -> Result<Option<BucketSummary>, StoreError> {
        let name = normalize_bucket(name)?;
        Ok(self
            .list_buckets()
            .await?
            .into_iter()
            .find(|b| b.name == name))
    }

    /// Create `bucket` if it does not exist, applying the default CORS rules
    /// when `auto_config_cors` is set.
    ///
    /// Returns whether the bucket was created.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<bool, StoreError> {
        let bucket = normalize_bucket(bucket)?;
        validate_bucket_name(&bucket)?;
        if self.client().head_bucket(&bucket).await? {
            return Ok(false);
        }
        self.client().create_bucket(&bucket).await?;
        info!(bucket = %bucket, "bucket created");
        if self.config.auto_config_cors {
            self.configure_cors(&bucket, &default_cors_rules()).await?;
        }
        Ok(true)
    }

    /// Replace the CORS rules of `bucket`.
    pub async fn configure_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), StoreError> {
        if rules.is_empty() {
            return Err(StoreError::Cors("no rules given".to_owned()));
        }
        let bucket = normalize_bucket(bucket)?;
        self.client().put_bucket_cors(&bucket, rules).await?;
        info!(bucket = %bucket, rules = rules.len(), "bucket CORS configured");
        Ok(())
    }

    /// Replace the CORS rules of `bucket` from an XML or JSON document.
    ///
    /// Documents starting with `<` are read as XML, anything else as JSON.
    pub async fn configure_cors_document(
        &self,
        bucket: &str,
        document: &str,
    ) -> Result<Vec<CorsRule>, StoreError> {
        let rules = if document.trim_start().starts_with('<') {
            parse_cors_xml(document)?
        } else {
            parse_cors_json(document)?
        };
        self.configure_cors(bucket, &rules).await?;
        Ok(rules)
    }

    /// Current CORS rules of `bucket`.
    pub async fn bucket_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, StoreError> {
        let bucket = normalize_bucket(bucket)?;
        Ok(self.client().get_bucket_cors(&bucket).await?)
    }

    /// Remove every CORS rule from `bucket`.
    pub async fn delete_bucket_cors(&self, bucket: &str) -> Result<(), StoreError> {
        let bucket = normalize_bucket(bucket)?;
        self.client().delete_bucket_cors(&bucket).await?;
        info!(bucket = %bucket, "bucket CORS removed");
        Ok(())
    }
}

/// Regular files under `root` with their `/`-separated relative paths,
/// sorted by relative path.
async fn walk_files(root: &Path) -> Result<Vec<(PathBuf, String)>, StoreError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let rel = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, rel));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Turn an object key remainder into a relative local path, refusing
/// anything that would escape the destination directory.
fn safe_relative_path(relative: &str) -> Result<PathBuf, StoreError> {
    let path: PathBuf = relative.split('/').filter(|s| !s.is_empty()).collect();
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes || path.as_os_str().is_empty() {
        return Err(StoreError::InvalidArgument(format!(
            "object key '{relative}' does not map to a local path"
        )));
    }
    Ok(path)
}

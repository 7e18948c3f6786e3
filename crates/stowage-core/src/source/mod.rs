//! Part sources.
//!
//! A [`PartSource`] turns one kind of payload into the parts of a multipart
//! upload. It validates its input locally, before the upload is initiated,
//! and then issues the per-part calls through a [`PartContext`]:
//!
//! - [`FileSlices`]: fixed-size byte ranges of a local file.
//! - [`BodyList`]: a caller-supplied list of pre-chunked bodies.
//! - [`ComposeSource`]: existing remote objects copied server-side as parts.

mod body;
mod compose;
mod file;

use async_trait::async_trait;
use stowage_model::limits::{MAX_OBJECT_SIZE, MAX_PART_SIZE, MAX_PARTS, MIN_PART_SIZE};
use stowage_model::{CompletedPart, UploadSession};
use tokio::sync::watch;
use tracing::debug;

use crate::body::RequestBody;
use crate::client::StorageClient;
use crate::error::{FailureCause, UploadError};

pub use self::body::BodyList;
pub use self::compose::{ComposePart, ComposeSource, default_ordering_key};
pub use self::file::{FileSlice, FileSlices, plan_slices};

/// Size and count limits enforced during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    /// Floor for every part but the last.
    pub min_part_size: u64,
    /// Ceiling for every part.
    pub max_part_size: u64,
    /// Maximum number of parts.
    pub max_parts: usize,
    /// Ceiling for the assembled object.
    pub max_object_size: u64,
}

impl Default for PartLimits {
    fn default() -> Self {
        Self {
            min_part_size: MIN_PART_SIZE,
            max_part_size: MAX_PART_SIZE,
            max_parts: MAX_PARTS,
            max_object_size: MAX_OBJECT_SIZE,
        }
    }
}

impl PartLimits {
    /// Check a part count against `1..=max_parts`.
    pub fn check_count(&self, count: usize) -> Result<(), UploadError> {
        if count == 0 {
            return Err(UploadError::Validation("no parts to upload".to_owned()));
        }
        if count > self.max_parts {
            return Err(UploadError::Validation(format!(
                "{count} parts exceed the limit of {}",
                self.max_parts
            )));
        }
        Ok(())
    }

    /// Check a total payload size against `max_object_size`.
    pub fn check_total(&self, total: u64) -> Result<(), UploadError> {
        if total > self.max_object_size {
            return Err(UploadError::Validation(format!(
                "{total} bytes exceed the object size limit of {}",
                self.max_object_size
            )));
        }
        Ok(())
    }

    /// Check the size of the part at `index` (zero-based) out of `count`.
    ///
    /// Non-last parts must be at least `min_part_size`; every part must be at
    /// most `max_part_size`.
    pub fn check_size(&self, index: usize, count: usize, size: u64) -> Result<(), UploadError> {
        let part_number = index + 1;
        if size > self.max_part_size {
            return Err(UploadError::Validation(format!(
                "part {part_number} is {size} bytes, above the maximum of {}",
                self.max_part_size
            )));
        }
        if part_number < count && size < self.min_part_size {
            return Err(UploadError::Validation(format!(
                "part {part_number} is {size} bytes, below the minimum of {} for non-last parts",
                self.min_part_size
            )));
        }
        Ok(())
    }
}

/// A payload that can be uploaded as the parts of one multipart upload.
#[async_trait]
pub trait PartSource: Send + Sync + std::fmt::Debug {
    /// Short name used in logs (`"file"`, `"bodies"`, `"compose"`).
    fn kind(&self) -> &'static str;

    /// Check the payload against `limits` without any remote call.
    async fn validate(&self, limits: &PartLimits) -> Result<(), UploadError>;

    /// Upload every part and return them in part-number order.
    async fn upload_parts(self, ctx: &PartContext<'_>) -> Result<Vec<CompletedPart>, FailureCause>
    where
        Self: Sized;
}

/// What a [`PartSource`] may use while uploading.
#[derive(Debug, Clone, Copy)]
pub struct PartContext<'a> {
    session: &'a UploadSession,
    client: &'a dyn StorageClient,
    cancel: Option<&'a watch::Receiver<bool>>,
}

impl<'a> PartContext<'a> {
    /// Create a context for `session`.
    #[must_use]
    pub fn new(
        session: &'a UploadSession,
        client: &'a dyn StorageClient,
        cancel: Option<&'a watch::Receiver<bool>>,
    ) -> Self {
        Self {
            session,
            client,
            cancel,
        }
    }

    /// The session parts belong to.
    #[must_use]
    pub fn session(&self) -> &UploadSession {
        self.session
    }

    /// The remote client.
    #[must_use]
    pub fn client(&self) -> &dyn StorageClient {
        self.client
    }

    /// Whether the caller has asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|rx| *rx.borrow())
    }

    /// Fail with [`FailureCause::Cancelled`] once the caller has asked to stop.
    pub fn check_cancelled(&self) -> Result<(), FailureCause> {
        if self.is_cancelled() {
            return Err(FailureCause::Cancelled);
        }
        Ok(())
    }

    /// Upload one part of the session.
    pub async fn upload_part(
        &self,
        part_number: u32,
        body: RequestBody,
    ) -> Result<CompletedPart, FailureCause> {
        self.check_cancelled()?;
        let s = self.session;
        let e_tag = self
            .client
            .upload_part(&s.bucket, &s.key, &s.upload_id, part_number, body)
            .await
            .map_err(|source| FailureCause::PartUpload {
                part_number,
                source,
            })?;
        debug!(
            bucket = %s.bucket,
            key = %s.key,
            upload_id = %s.upload_id,
            part_number,
            e_tag = %e_tag,
            "part uploaded"
        );
        Ok(CompletedPart::new(part_number, e_tag))
    }

    /// Copy a whole remote object into one part of the session.
    pub async fn upload_part_copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        part_number: u32,
    ) -> Result<CompletedPart, FailureCause> {
        self.check_cancelled()?;
        let s = self.session;
        let e_tag = self
            .client
            .upload_part_copy(
                source_bucket,
                source_key,
                &s.bucket,
                &s.key,
                &s.upload_id,
                part_number,
            )
            .await
            .map_err(|source| FailureCause::PartUpload {
                part_number,
                source,
            })?;
        debug!(
            bucket = %s.bucket,
            key = %s.key,
            upload_id = %s.upload_id,
            source_bucket,
            source_key,
            part_number,
            "part copied"
        );
        Ok(CompletedPart::new(part_number, e_tag))
    }
}

/// Convert a zero-based index into a part number.
fn part_number(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

//! Multipart upload orchestration.
//!
//! [`MultipartUploader::upload`] drives one upload through its whole
//! lifecycle:
//!
//! 1. Normalize the bucket and validate the source locally. Nothing is sent
//!    if this fails.
//! 2. `CreateMultipartUpload`. A failure here leaves nothing to clean up.
//! 3. Let the [`PartSource`] upload its parts, in part-number order.
//! 4. `CompleteMultipartUpload` with the sorted part list.
//!
//! Any failure after step 2 triggers one abort-and-verify cycle: abort, list
//! the parts still held, and abort again while any remain, up to the
//! configured [`AbortPolicy`]. The returned error carries both the original
//! failure and whether cleanup was confirmed.

mod abort;

use std::sync::Arc;

use stowage_model::{
    CompletedUpload, PartSummary, UploadSession, UploadState, validate_completed_parts,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub use self::abort::{AbortOutcome, AbortPolicy, MAX_ABORT_BACKOFF};
use crate::client::{ClientError, StorageClient};
use crate::error::{FailureCause, UploadError};
use crate::naming::{normalize_bucket, validate_object_key};
use crate::source::{PartContext, PartLimits, PartSource};

/// Runs multipart uploads against a [`StorageClient`].
///
/// Cheap to clone; clones share the client and the cancellation signal.
#[derive(Debug, Clone)]
pub struct MultipartUploader {
    client: Arc<dyn StorageClient>,
    limits: PartLimits,
    abort_policy: AbortPolicy,
    cancel: Option<watch::Receiver<bool>>,
}

impl MultipartUploader {
    /// Create an uploader with S3 default limits and abort policy.
    #[must_use]
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self {
            client,
            limits: PartLimits::default(),
            abort_policy: AbortPolicy::default(),
            cancel: None,
        }
    }

    /// Use `limits` for source validation.
    #[must_use]
    pub fn with_limits(mut self, limits: PartLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Use `policy` for abort-and-verify.
    #[must_use]
    pub fn with_abort_policy(mut self, policy: AbortPolicy) -> Self {
        self.abort_policy = policy;
        self
    }

    /// Stop uploading parts once `cancel` turns `true`.
    ///
    /// Cancellation is checked before every part and before completion; a
    /// cancelled upload is aborted like any other failure.
    #[must_use]
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn StorageClient> {
        &self.client
    }

    /// Upload `source` to `bucket/key` as one multipart upload.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Validation`]: bad bucket, key or source; nothing sent.
    /// - [`UploadError::Initiation`]: `CreateMultipartUpload` failed.
    /// - [`UploadError::Aborted`]: a later step failed; storage is clean.
    /// - [`UploadError::AbortIncomplete`]: a later step failed and cleanup
    ///   could not be confirmed.
    pub async fn upload<S: PartSource>(
        &self,
        bucket: &str,
        key: &str,
        source: S,
    ) -> Result<CompletedUpload, UploadError> {
        let mut lifecycle = Lifecycle::new(bucket, key);

        let bucket = match self.check_preconditions(bucket, key, &source).await {
            Ok(bucket) => bucket,
            Err(err) => {
                lifecycle.advance(UploadState::ValidationFailed);
                debug!(bucket, key, source = source.kind(), error = %err, "upload rejected");
                return Err(err);
            }
        };
        lifecycle.bucket.clone_from(&bucket);

        let upload_id = match self.client.create_multipart_upload(&bucket, key).await {
            Ok(upload_id) => upload_id,
            Err(source) => {
                lifecycle.advance(UploadState::ValidationFailed);
                return Err(UploadError::Initiation {
                    bucket,
                    key: key.to_owned(),
                    source,
                });
            }
        };
        let session = UploadSession::new(bucket, key, upload_id);
        lifecycle.upload_id.clone_from(&session.upload_id);
        lifecycle.advance(UploadState::Initiated);
        info!(
            bucket = %session.bucket,
            key = %session.key,
            upload_id = %session.upload_id,
            source = source.kind(),
            "multipart upload initiated"
        );

        lifecycle.advance(UploadState::PartsInFlight);
        let cause = match self.upload_and_complete(&session, source).await {
            Ok(done) => {
                lifecycle.advance(UploadState::Completed);
                info!(
                    bucket = %session.bucket,
                    key = %session.key,
                    upload_id = %session.upload_id,
                    e_tag = done.e_tag.as_deref().unwrap_or_default(),
                    "multipart upload completed"
                );
                return Ok(done);
            }
            Err(cause) => cause,
        };

        lifecycle.advance(UploadState::Aborting);
        warn!(
            bucket = %session.bucket,
            key = %session.key,
            upload_id = %session.upload_id,
            error = %cause,
            "multipart upload failed, aborting"
        );

        match self.abort_and_verify(&session).await {
            AbortOutcome::Clean { attempts } => {
                lifecycle.advance(UploadState::Aborted);
                Err(UploadError::Aborted {
                    session,
                    cause,
                    attempts,
                })
            }
            AbortOutcome::Incomplete {
                remaining_parts,
                error: abort_error,
                ..
            } => {
                lifecycle.advance(UploadState::AbortFailed);
                Err(UploadError::AbortIncomplete {
                    session,
                    cause,
                    remaining_parts,
                    abort_error,
                })
            }
        }
    }

    /// Abort `session` and keep aborting until no parts are listed.
    ///
    /// An upload the service no longer knows (`NoSuchUpload`) counts as
    /// clean, which makes this safe to call on an already-aborted session.
    pub async fn abort_and_verify(&self, session: &UploadSession) -> AbortOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .client
                .abort_multipart_upload(&session.bucket, &session.key, &session.upload_id)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_no_such_upload() => {}
                Err(e) => {
                    error!(
                        bucket = %session.bucket,
                        key = %session.key,
                        upload_id = %session.upload_id,
                        attempts,
                        error = %e,
                        "abort failed, cleanup unconfirmed"
                    );
                    return AbortOutcome::Incomplete {
                        attempts,
                        remaining_parts: None,
                        error: Some(e),
                    };
                }
            }

            let remaining = match self.list_all_parts(session).await {
                Ok(parts) => parts.len(),
                Err(e) if e.is_no_such_upload() => 0,
                Err(e) => {
                    error!(
                        bucket = %session.bucket,
                        key = %session.key,
                        upload_id = %session.upload_id,
                        attempts,
                        error = %e,
                        "listing parts after abort failed, cleanup unconfirmed"
                    );
                    return AbortOutcome::Incomplete {
                        attempts,
                        remaining_parts: None,
                        error: Some(e),
                    };
                }
            };

            if remaining == 0 {
                info!(
                    bucket = %session.bucket,
                    key = %session.key,
                    upload_id = %session.upload_id,
                    attempts,
                    "multipart upload aborted"
                );
                return AbortOutcome::Clean { attempts };
            }

            if attempts >= self.abort_policy.max_attempts() {
                error!(
                    bucket = %session.bucket,
                    key = %session.key,
                    upload_id = %session.upload_id,
                    attempts,
                    remaining,
                    "parts still listed after last abort, cleanup unconfirmed"
                );
                return AbortOutcome::Incomplete {
                    attempts,
                    remaining_parts: Some(remaining),
                    error: None,
                };
            }

            let delay = self.abort_policy.backoff_for(attempts);
            warn!(
                bucket = %session.bucket,
                key = %session.key,
                upload_id = %session.upload_id,
                attempts,
                remaining,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "parts still listed after abort, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// List every part held for `session`, following truncated pages.
    ///
    /// # Errors
    ///
    /// Returns the first failing `ListParts` error, or a transport error if a
    /// truncated page does not advance the part-number marker.
    pub async fn list_all_parts(
        &self,
        session: &UploadSession,
    ) -> Result<Vec<PartSummary>, ClientError> {
        let mut parts = Vec::new();
        let mut marker = None;
        loop {
            let page = self
                .client
                .list_parts(&session.bucket, &session.key, &session.upload_id, marker)
                .await?;
            parts.extend(page.parts);
            if !page.is_truncated {
                return Ok(parts);
            }
            match page.next_part_number_marker {
                Some(next) if Some(next) != marker => marker = Some(next),
                _ => {
                    return Err(ClientError::transport(
                        "ListParts",
                        "truncated page did not advance the part number marker",
                    ));
                }
            }
        }
    }

    async fn check_preconditions<S: PartSource>(
        &self,
        bucket: &str,
        key: &str,
        source: &S,
    ) -> Result<String, UploadError> {
        let bucket = normalize_bucket(bucket)?;
        validate_object_key(key)?;
        source.validate(&self.limits).await?;
        Ok(bucket)
    }

    async fn upload_and_complete<S: PartSource>(
        &self,
        session: &UploadSession,
        source: S,
    ) -> Result<CompletedUpload, FailureCause> {
        let ctx = PartContext::new(session, self.client.as_ref(), self.cancel.as_ref());
        let mut parts = source.upload_parts(&ctx).await?;
        parts.sort_by_key(|p| p.part_number);
        validate_completed_parts(&parts)?;
        ctx.check_cancelled()?;

        self.client
            .complete_multipart_upload(&session.bucket, &session.key, &session.upload_id, &parts)
            .await
            .map_err(FailureCause::Finalize)
    }
}

/// Tracks the [`UploadState`] of one invocation and logs each transition.
struct Lifecycle {
    bucket: String,
    key: String,
    upload_id: String,
    state: UploadState,
}

impl Lifecycle {
    fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            upload_id: String::new(),
            state: UploadState::Idle,
        }
    }

    fn advance(&mut self, next: UploadState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal upload transition {} -> {next}",
            self.state
        );
        debug!(
            bucket = %self.bucket,
            key = %self.key,
            upload_id = %self.upload_id,
            from = %self.state,
            to = %next,
            "upload state changed"
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stowage_model::CompletionOrigin;
    use stowage_model::limits::MIB;

    use super::*;
    use crate::body::RequestBody;
    use crate::memory::{Call, MemoryStorage};
    use crate::source::{BodyList, ComposeSource, FileSlices};

    const SMALL: u64 = 4;

    fn small_limits() -> PartLimits {
        PartLimits {
            min_part_size: SMALL,
            ..PartLimits::default()
        }
    }

    fn storage() -> Arc<MemoryStorage> {
        Arc::new(
            MemoryStorage::new()
                .with_bucket("media")
                .with_min_part_size(SMALL),
        )
    }

    fn uploader(storage: &Arc<MemoryStorage>) -> MultipartUploader {
        MultipartUploader::new(storage.clone())
            .with_limits(small_limits())
            .with_abort_policy(AbortPolicy::new(5, Duration::ZERO))
    }

    fn bodies(sizes: &[usize]) -> BodyList {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let byte = u8::try_from(i).expect("few parts");
                RequestBody::from_bytes(vec![byte; n])
            })
            .collect()
    }

    #[tokio::test]
    async fn test_should_upload_file_in_three_parts() {
        let storage = Arc::new(MemoryStorage::new().with_bucket("media"));
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let data: Vec<u8> = (0..12 * MIB).map(|i| (i % 251) as u8).collect();
        std::fs::write(file.path(), &data).expect("write");

        let done = MultipartUploader::new(storage.clone())
            .upload("Media", "videos/clip.bin", FileSlices::new(file.path()))
            .await
            .expect("upload succeeds");

        assert_eq!(done.bucket, "media");
        assert!(matches!(done.origin, CompletionOrigin::Multipart { parts: 3, .. }));
        let sizes: Vec<_> = storage
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UploadPart { size, .. } => Some(size / MIB),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, [5, 5, 2]);
        assert!(storage.calls().contains(&Call::CompleteMultipartUpload {
            part_numbers: vec![1, 2, 3]
        }));
        assert_eq!(
            storage.object("media", "videos/clip.bin").as_deref(),
            Some(&data[..])
        );
        assert_eq!(storage.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_should_abort_and_verify_after_part_failure() {
        let storage = storage();
        storage.fail_part(2);
        storage.leave_parts_after_abort(1, 1);

        let err = uploader(&storage)
            .upload("media", "k", bodies(&[4, 4, 4]))
            .await
            .expect_err("part 2 fails");

        let UploadError::Aborted {
            session,
            cause,
            attempts,
        } = &err
        else {
            panic!("expected a clean abort, got {err:?}");
        };
        assert_eq!(*attempts, 2);
        assert!(matches!(cause, FailureCause::PartUpload { part_number: 2, .. }));
        assert!(err.cleanup_confirmed());
        assert_eq!(storage.call_count("AbortMultipartUpload"), 2);
        assert_eq!(storage.call_count("ListParts"), 2);
        assert_eq!(storage.call_count("CompleteMultipartUpload"), 0);
        assert_eq!(storage.pending_parts(&session.upload_id), None);
    }

    #[tokio::test]
    async fn test_should_compose_sources_in_numeric_order() {
        let storage = storage();
        for (key, data) in [("parts/3", "cc"), ("parts/1", "aaaa"), ("parts/2", "bbbb")] {
            storage.insert_object("media", key, data.as_bytes().to_vec());
        }
        let source = ComposeSource::from_keys("media", ["parts/3", "parts/1", "parts/2"])
            .expect("numeric keys");

        uploader(&storage)
            .upload("media", "merged", source)
            .await
            .expect("compose succeeds");

        let copies: Vec<_> = storage
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UploadPartCopy {
                    source_key,
                    part_number,
                } => Some((source_key, part_number)),
                _ => None,
            })
            .collect();
        assert_eq!(
            copies,
            [
                ("parts/1".to_owned(), 1),
                ("parts/2".to_owned(), 2),
                ("parts/3".to_owned(), 3)
            ]
        );
        assert_eq!(
            storage.object("media", "merged").as_deref(),
            Some(&b"aaaabbbbcc"[..])
        );
    }

    #[tokio::test]
    async fn test_should_reject_small_first_body_without_remote_calls() {
        let storage = Arc::new(MemoryStorage::new().with_bucket("media"));
        let list = BodyList::new(vec![
            RequestBody::from_file_range("/unused", 0, 3 * MIB),
            RequestBody::from_file_range("/unused", 0, 5 * MIB),
        ]);

        let err = MultipartUploader::new(storage.clone())
            .upload("media", "k", list)
            .await
            .expect_err("3 MiB first part");

        assert!(matches!(err, UploadError::Validation(_)));
        assert_eq!(err.terminal_state(), UploadState::ValidationFailed);
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_empty_key_without_remote_calls() {
        let storage = storage();
        let err = uploader(&storage)
            .upload("media", "", bodies(&[4]))
            .await
            .expect_err("empty key");
        assert!(matches!(err, UploadError::Validation(_)));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_not_abort_when_initiation_fails() {
        let storage = storage();
        let err = uploader(&storage)
            .upload("missing-bucket", "k", bodies(&[4]))
            .await
            .expect_err("bucket does not exist");

        assert!(matches!(err, UploadError::Initiation { .. }));
        assert!(err.session().is_none());
        assert_eq!(storage.call_count("AbortMultipartUpload"), 0);
    }

    #[tokio::test]
    async fn test_should_abort_after_finalize_failure() {
        let storage = storage();
        storage.fail_complete();

        let err = uploader(&storage)
            .upload("media", "k", bodies(&[4, 1]))
            .await
            .expect_err("complete fails");

        assert!(matches!(
            err,
            UploadError::Aborted {
                cause: FailureCause::Finalize(_),
                attempts: 1,
                ..
            }
        ));
        assert_eq!(storage.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_should_report_unconfirmed_cleanup_when_abort_fails() {
        let storage = storage();
        storage.fail_part(1);
        storage.fail_abort();

        let err = uploader(&storage)
            .upload("media", "k", bodies(&[4, 4]))
            .await
            .expect_err("part 1 fails");

        assert!(!err.cleanup_confirmed());
        let UploadError::AbortIncomplete {
            cause, abort_error, ..
        } = err
        else {
            panic!("expected unconfirmed cleanup");
        };
        assert!(matches!(cause, FailureCause::PartUpload { part_number: 1, .. }));
        assert_eq!(
            abort_error.as_ref().map(ClientError::operation),
            Some("AbortMultipartUpload")
        );
        assert_eq!(storage.call_count("AbortMultipartUpload"), 1);
        assert_eq!(storage.call_count("ListParts"), 0);
    }

    #[tokio::test]
    async fn test_should_report_abort_incomplete_when_list_parts_fails() {
        let storage = storage();
        storage.fail_part(2);
        storage.fail_list_parts();

        let err = uploader(&storage)
            .upload("media", "k", bodies(&[4, 4]))
            .await
            .expect_err("part 2 fails");

        assert!(!err.cleanup_confirmed());
        let UploadError::AbortIncomplete {
            cause,
            remaining_parts,
            abort_error,
            ..
        } = err
        else {
            panic!("expected unconfirmed cleanup");
        };
        assert!(matches!(cause, FailureCause::PartUpload { part_number: 2, .. }));
        assert_eq!(remaining_parts, None);
        assert_eq!(
            abort_error.as_ref().map(ClientError::operation),
            Some("ListParts")
        );
        assert_eq!(storage.call_count("AbortMultipartUpload"), 1);
        assert_eq!(storage.call_count("ListParts"), 1);
    }

    #[tokio::test]
    async fn test_should_report_initiation_transport_failure() {
        let storage = storage();
        storage.fail_create();

        let err = uploader(&storage)
            .upload("media", "k", bodies(&[4, 1]))
            .await
            .expect_err("create fails");

        assert!(err.cleanup_confirmed());
        let UploadError::Initiation { bucket, source, .. } = err else {
            panic!("expected an initiation failure");
        };
        assert_eq!(bucket, "media");
        assert_eq!(source.code(), None);
        assert_eq!(source.operation(), "CreateMultipartUpload");
        assert_eq!(storage.call_count("UploadPart"), 0);
        assert_eq!(storage.call_count("AbortMultipartUpload"), 0);
    }

    #[tokio::test]
    async fn test_should_stop_after_max_abort_attempts() {
        let storage = storage();
        storage.fail_part(3);
        storage.leave_parts_after_abort(100, 1);

        let err = uploader(&storage)
            .with_abort_policy(AbortPolicy::new(3, Duration::ZERO))
            .upload("media", "k", bodies(&[4, 4, 4]))
            .await
            .expect_err("part 3 fails");

        assert!(matches!(
            err,
            UploadError::AbortIncomplete {
                remaining_parts: Some(1),
                abort_error: None,
                ..
            }
        ));
        assert_eq!(storage.call_count("AbortMultipartUpload"), 3);
    }

    #[tokio::test]
    async fn test_should_treat_repeated_abort_as_clean() {
        let storage = storage();
        let uploader = uploader(&storage);
        let upload_id = storage
            .create_multipart_upload("media", "k")
            .await
            .expect("create");
        let session = UploadSession::new("media", "k", upload_id);

        assert_eq!(
            uploader.abort_and_verify(&session).await,
            AbortOutcome::Clean { attempts: 1 }
        );
        let lists_before = storage.call_count("ListParts");
        assert_eq!(
            uploader.abort_and_verify(&session).await,
            AbortOutcome::Clean { attempts: 1 }
        );
        assert_eq!(storage.call_count("ListParts"), lists_before + 1);
    }

    #[tokio::test]
    async fn test_should_treat_unknown_upload_as_clean() {
        let storage = storage();
        let session = UploadSession::new("media", "k", "never-created");
        let outcome = uploader(&storage).abort_and_verify(&session).await;
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn test_should_follow_list_parts_pages() {
        let storage = Arc::new(
            MemoryStorage::new()
                .with_bucket("media")
                .with_list_page_size(2),
        );
        let upload_id = storage
            .create_multipart_upload("media", "k")
            .await
            .expect("create");
        for n in 1..=5 {
            storage
                .upload_part("media", "k", &upload_id, n, RequestBody::from_bytes(vec![0u8; 1]))
                .await
                .expect("part");
        }

        let session = UploadSession::new("media", "k", upload_id);
        let parts = MultipartUploader::new(storage.clone())
            .list_all_parts(&session)
            .await
            .expect("list");

        assert_eq!(
            parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            [1, 2, 3, 4, 5]
        );
        assert_eq!(storage.call_count("ListParts"), 3);
    }

    #[tokio::test]
    async fn test_should_abort_when_cancelled() {
        let storage = storage();
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");

        let err = uploader(&storage)
            .with_cancel(rx)
            .upload("media", "k", bodies(&[4, 4]))
            .await
            .expect_err("cancelled");

        assert!(matches!(
            err,
            UploadError::Aborted {
                cause: FailureCause::Cancelled,
                ..
            }
        ));
        assert_eq!(storage.call_count("UploadPart"), 0);
        assert_eq!(storage.call_count("CreateMultipartUpload"), 1);
    }
}

//! Multipart upload sessions, parts and completion results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::{MAX_PART_NUMBER, MIN_PART_NUMBER};

/// A multipart upload session assigned by the remote service.
///
/// Created when `CreateMultipartUpload` succeeds and alive until the upload
/// is completed or aborted. A session is owned by exactly one orchestrator
/// invocation; its `upload_id` is never shared across uploads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Normalized (lower-cased) bucket name.
    pub bucket: String,
    /// Destination object key.
    pub key: String,
    /// Opaque upload identifier returned at initiation.
    pub upload_id: String,
}

impl UploadSession {
    /// Create a new session.
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
        }
    }
}

impl fmt::Display for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload {} of {}/{}", self.upload_id, self.bucket, self.key)
    }
}

/// A part accepted by the remote service, as passed to
/// `CompleteMultipartUpload`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    /// Part number (1-based).
    pub part_number: u32,
    /// Entity tag returned by `UploadPart` / `UploadPartCopy`.
    pub e_tag: String,
}

impl CompletedPart {
    /// Create a completed part.
    #[must_use]
    pub fn new(part_number: u32, e_tag: impl Into<String>) -> Self {
        Self {
            part_number,
            e_tag: e_tag.into(),
        }
    }
}

/// Ways a completed-part list can violate the `1..=N` ordering rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartOrderError {
    /// No parts were produced.
    #[error("no parts were uploaded")]
    Empty,

    /// More parts than the protocol allows.
    #[error("{count} parts exceed the limit of {MAX_PART_NUMBER}")]
    TooMany {
        /// Number of parts produced.
        count: usize,
    },

    /// A part number is missing, duplicated or out of order.
    #[error("expected part number {expected} at position {index}, found {found}")]
    Unexpected {
        /// Zero-based position in the list.
        index: usize,
        /// The part number that should be at this position.
        expected: u32,
        /// The part number that was found.
        found: u32,
    },
}

/// Check that `parts` is exactly `1..=N`, ascending, without gaps or
/// duplicates.
///
/// # Examples
///
/// ```
/// use stowage_model::{CompletedPart, validate_completed_parts};
///
/// let parts = vec![CompletedPart::new(1, "a"), CompletedPart::new(2, "b")];
/// assert!(validate_completed_parts(&parts).is_ok());
///
/// let gap = vec![CompletedPart::new(1, "a"), CompletedPart::new(3, "c")];
/// assert!(validate_completed_parts(&gap).is_err());
/// ```
pub fn validate_completed_parts(parts: &[CompletedPart]) -> Result<(), PartOrderError> {
    if parts.is_empty() {
        return Err(PartOrderError::Empty);
    }
    if parts.len() > MAX_PART_NUMBER as usize {
        return Err(PartOrderError::TooMany { count: parts.len() });
    }
    for (index, part) in parts.iter().enumerate() {
        // Bounded by MAX_PART_NUMBER above.
        #[allow(clippy::cast_possible_truncation)]
        let expected = MIN_PART_NUMBER + index as u32;
        if part.part_number != expected {
            return Err(PartOrderError::Unexpected {
                index,
                expected,
                found: part.part_number,
            });
        }
    }
    Ok(())
}

/// A part still held by the remote service for an upload, as reported by
/// `ListParts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartSummary {
    /// Part number.
    pub part_number: u32,
    /// Entity tag of the stored part.
    pub e_tag: String,
    /// Size of the part in bytes.
    pub size: u64,
}

/// One page of a `ListParts` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPartsPage {
    /// Parts on this page.
    pub parts: Vec<PartSummary>,
    /// Whether more pages remain.
    pub is_truncated: bool,
    /// Marker to pass to fetch the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_part_number_marker: Option<u32>,
}

/// How a [`CompletedUpload`] came to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum CompletionOrigin {
    /// Finalized by `CompleteMultipartUpload`.
    Multipart {
        /// The upload that was completed.
        upload_id: String,
        /// Number of parts assembled.
        parts: usize,
    },
    /// Produced by a single `CopyObject` (single-source compose).
    ///
    /// Fields with no copy equivalent (`location`) are left empty.
    CopyObject,
}

/// Metadata of a finalized object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Entity tag of the final object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    /// Version ID when the bucket is versioned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// Object URL reported by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Lifecycle expiration header, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    /// Server-side encryption algorithm applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_side_encryption: Option<String>,
    /// Which operation produced this result.
    pub origin: CompletionOrigin,
}

impl CompletedUpload {
    /// Repackage a `CopyObject` response as a completion result.
    ///
    /// The mapping is field-for-field where an equivalent exists:
    ///
    /// | `CopyObjectResult` | `CompletedUpload` |
    /// |--------------------|-------------------|
    /// | `e_tag` | `e_tag` |
    /// | `version_id` | `version_id` |
    /// | `expiration` | `expiration` |
    /// | `server_side_encryption` | `server_side_encryption` |
    /// | `last_modified` | *(dropped)* |
    /// | *(none)* | `location = None` |
    #[must_use]
    pub fn from_copy(
        bucket: impl Into<String>,
        key: impl Into<String>,
        copy: CopyObjectResult,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            e_tag: copy.e_tag,
            version_id: copy.version_id,
            location: None,
            expiration: copy.expiration,
            server_side_encryption: copy.server_side_encryption,
            origin: CompletionOrigin::CopyObject,
        }
    }

    /// Whether this result came from a real multipart completion.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self.origin, CompletionOrigin::Multipart { .. })
    }
}

/// Result of a server-side `CopyObject`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyObjectResult {
    /// Entity tag of the new object.
    pub e_tag: Option<String>,
    /// Version ID of the new object.
    pub version_id: Option<String>,
    /// Lifecycle expiration header, if any.
    pub expiration: Option<String>,
    /// Server-side encryption algorithm applied.
    pub server_side_encryption: Option<String>,
    /// Last-modified timestamp of the copy.
    pub last_modified: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_accept_contiguous_parts() {
        let parts: Vec<_> = (1..=3)
            .map(|n| CompletedPart::new(n, format!("\"etag-{n}\"")))
            .collect();
        assert!(validate_completed_parts(&parts).is_ok());
    }

    #[test]
    fn test_should_reject_empty_part_list() {
        assert_eq!(validate_completed_parts(&[]), Err(PartOrderError::Empty));
    }

    #[test]
    fn test_should_reject_duplicates_and_gaps() {
        let dup = vec![
            CompletedPart::new(1, "a"),
            CompletedPart::new(1, "b"),
            CompletedPart::new(2, "c"),
        ];
        assert_eq!(
            validate_completed_parts(&dup),
            Err(PartOrderError::Unexpected {
                index: 1,
                expected: 2,
                found: 1
            })
        );

        let unsorted = vec![CompletedPart::new(2, "b"), CompletedPart::new(1, "a")];
        assert!(validate_completed_parts(&unsorted).is_err());
    }

    #[test]
    fn test_should_map_copy_result_into_completion() {
        let copy = CopyObjectResult {
            e_tag: Some("\"abc\"".to_owned()),
            version_id: Some("v1".to_owned()),
            expiration: None,
            server_side_encryption: Some("AES256".to_owned()),
            last_modified: Some(Utc::now()),
        };
        let done = CompletedUpload::from_copy("dest", "merged.bin", copy);

        assert_eq!(done.bucket, "dest");
        assert_eq!(done.key, "merged.bin");
        assert_eq!(done.e_tag.as_deref(), Some("\"abc\""));
        assert_eq!(done.version_id.as_deref(), Some("v1"));
        assert_eq!(done.server_side_encryption.as_deref(), Some("AES256"));
        assert!(done.location.is_none());
        assert_eq!(done.origin, CompletionOrigin::CopyObject);
        assert!(!done.is_multipart());
    }

    #[test]
    fn test_should_serialize_origin_with_kind_tag() {
        let origin = CompletionOrigin::Multipart {
            upload_id: "u-1".to_owned(),
            parts: 3,
        };
        let json = serde_json::to_string(&origin).expect("test serialization");
        assert!(json.contains("\"kind\":\"multipart\""));
        assert!(json.contains("\"uploadId\":\"u-1\""));
    }
}

//! Object and bucket listings, deletes and single-request upload results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a `ListObjectsV2` page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Entity tag, quoted as returned by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    /// Last modification time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectSummary {
    /// Create a summary with only key and size set.
    #[must_use]
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            e_tag: None,
            last_modified: None,
        }
    }

    /// The last `/`-separated segment of the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use stowage_model::ObjectSummary;
    ///
    /// assert_eq!(ObjectSummary::new("chunks/abc/7", 1).file_name(), "7");
    /// assert_eq!(ObjectSummary::new("plain", 1).file_name(), "plain");
    /// ```
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// One page of an object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPage {
    /// Objects on this page.
    pub objects: Vec<ObjectSummary>,
    /// Token for the next page; `None` on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
}

/// Result of a single-request `PutObject`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutObjectResult {
    /// Entity tag of the stored object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    /// Version ID when the bucket is versioned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// An object, or one version of it, addressed by a batch delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectIdentifier {
    /// Object key.
    pub key: String,
    /// Version to delete; `None` targets the current version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

impl ObjectIdentifier {
    /// Address the current version of `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    /// Address one version of `key`.
    #[must_use]
    pub fn versioned(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }
}

/// A key the service refused to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteError {
    /// Object key.
    pub key: String,
    /// Version, when one was addressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// Service error code, e.g. `AccessDenied`.
    pub code: String,
    /// Service error message.
    pub message: String,
}

/// Outcome of a `DeleteObjects` batch.
///
/// S3 reports a key that never existed as deleted, so `deleted` can name
/// keys that were not present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteObjectsResult {
    /// Objects removed.
    pub deleted: Vec<ObjectIdentifier>,
    /// Objects the service refused to remove.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<DeleteError>,
}

impl DeleteObjectsResult {
    /// Whether every object in the batch was deleted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One bucket owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    /// Bucket name.
    pub name: String,
    /// Creation time, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
}

//! Bucket and object name handling.
//!
//! Bucket names are case-folded before any request is made. Generated
//! upload keys follow the layout `{base_dir}/{yyyy/MM/dd}/{uuid}-{name}`.
//! Bucket rules follow the
//! [Amazon S3 naming rules](https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html).

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};

use crate::error::{StoreError, UploadError};

/// Base directory used when none is configured.
pub const DEFAULT_UPLOAD_BASE_DIR: &str = "uploads";

/// Maximum object key length in bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// A bucket name or object key was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{name}': {reason}")]
pub struct NameError {
    /// `"bucket name"` or `"object key"`.
    pub kind: &'static str,
    /// The rejected name.
    pub name: String,
    /// Which rule was violated.
    pub reason: String,
}

impl NameError {
    fn bucket(name: &str, reason: impl Into<String>) -> Self {
        Self {
            kind: "bucket name",
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<NameError> for UploadError {
    fn from(err: NameError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<NameError> for StoreError {
    fn from(err: NameError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Trim and lower-case a bucket name.
///
/// # Errors
///
/// Returns [`NameError`] if the name is empty after trimming.
///
/// # Examples
///
/// ```
/// use stowage_core::naming::normalize_bucket;
///
/// assert_eq!(normalize_bucket(" My-Bucket ").unwrap(), "my-bucket");
/// assert!(normalize_bucket("  ").is_err());
/// ```
pub fn normalize_bucket(bucket: &str) -> Result<String, NameError> {
    let trimmed = bucket.trim();
    if trimmed.is_empty() {
        return Err(NameError::bucket(bucket, "bucket name must not be empty"));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Validate an S3 bucket name.
///
/// Rules:
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and dots
/// - Must start and end with a letter or number
/// - No consecutive dots (`..`)
/// - Not formatted as an IPv4 or IPv6 address
/// - Must not start with `xn--` or `sthree-`
/// - Must not end with `-s3alias` or `--ol-s3`
///
/// # Errors
///
/// Returns [`NameError`] naming the first violated rule.
///
/// # Examples
///
/// ```
/// use stowage_core::naming::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-valid-bucket").is_ok());
/// assert!(validate_bucket_name("AB").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<(), NameError> {
    let len = name.len();

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return Err(NameError::bucket(
            name,
            format!(
                "must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters long"
            ),
        ));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(NameError::bucket(
            name,
            "must only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[len - 1]) {
        return Err(NameError::bucket(
            name,
            "must start and end with a letter or number",
        ));
    }

    if name.contains("..") {
        return Err(NameError::bucket(name, "must not contain consecutive dots"));
    }

    if name.parse::<Ipv4Addr>().is_ok() || name.parse::<Ipv6Addr>().is_ok() {
        return Err(NameError::bucket(
            name,
            "must not be formatted as an IP address",
        ));
    }

    for prefix in ["xn--", "sthree-"] {
        if name.starts_with(prefix) {
            return Err(NameError::bucket(
                name,
                format!("must not start with '{prefix}'"),
            ));
        }
    }

    for suffix in ["-s3alias", "--ol-s3"] {
        if name.ends_with(suffix) {
            return Err(NameError::bucket(name, format!("must not end with '{suffix}'")));
        }
    }

    Ok(())
}

/// Whether a bucket name looks like a DNS host (`a.b[.c…]`).
///
/// Such buckets break virtual-hosted TLS certificates and must be addressed
/// path-style.
///
/// # Examples
///
/// ```
/// use stowage_core::naming::is_like_host;
///
/// assert!(is_like_host("static.example.com"));
/// assert!(!is_like_host("plain-bucket"));
/// ```
#[must_use]
pub fn is_like_host(name: &str) -> bool {
    let mut labels = 0usize;
    for label in name.split('.') {
        if label.is_empty()
            || !label
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return false;
        }
        labels += 1;
    }
    labels >= 2
}

/// Validate an S3 object key (1-1024 bytes).
///
/// # Errors
///
/// Returns [`NameError`] if the key is empty or too long.
pub fn validate_object_key(key: &str) -> Result<(), NameError> {
    let reason = if key.is_empty() {
        "must not be empty".to_owned()
    } else if key.len() > MAX_KEY_BYTES {
        format!("must be at most {MAX_KEY_BYTES} bytes, got {}", key.len())
    } else {
        return Ok(());
    };
    Err(NameError {
        kind: "object key",
        name: key.to_owned(),
        reason,
    })
}

/// Generate a unique upload prefix: `{base_dir}/{yyyy/MM/dd}/{uuid}`.
///
/// An empty `base_dir` falls back to [`DEFAULT_UPLOAD_BASE_DIR`]. Leading and
/// trailing slashes of `base_dir` are dropped.
#[must_use]
pub fn upload_prefix(base_dir: &str, now: DateTime<Utc>) -> String {
    let base = base_dir.trim_matches('/');
    let base = if base.is_empty() {
        DEFAULT_UPLOAD_BASE_DIR
    } else {
        base
    };
    format!(
        "{base}/{}/{}",
        now.format("%Y/%m/%d"),
        uuid::Uuid::new_v4().simple()
    )
}

/// Generate a unique object key for an uploaded file name:
/// `{base_dir}/{yyyy/MM/dd}/{uuid}-{name}`.
///
/// # Examples
///
/// ```
/// use stowage_core::naming::upload_object_name;
///
/// let key = upload_object_name("report.pdf", "docs");
/// assert!(key.starts_with("docs/"));
/// assert!(key.ends_with("-report.pdf"));
/// ```
#[must_use]
pub fn upload_object_name(name: &str, base_dir: &str) -> String {
    format!("{}-{name}", upload_prefix(base_dir, Utc::now()))
}

//! Fixed-size slices of a local file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use stowage_model::CompletedPart;
use stowage_model::limits::DEFAULT_PART_SIZE;

use super::{PartContext, PartLimits, PartSource, part_number};
use crate::body::{RequestBody, read_range};
use crate::error::{FailureCause, UploadError};

/// One planned byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSlice {
    /// Part number (1-based).
    pub part_number: u32,
    /// Offset of the first byte.
    pub offset: u64,
    /// Number of bytes.
    pub length: u64,
}

/// Split `len` bytes into parts of `part_size` bytes; the last one may be
/// shorter.
///
/// Produces `ceil(len / part_size)` slices numbered from 1. A zero `len` or
/// `part_size` yields no slices.
///
/// # Examples
///
/// ```
/// use stowage_core::source::plan_slices;
///
/// const MIB: u64 = 1024 * 1024;
/// let slices = plan_slices(12 * MIB, 5 * MIB);
/// let lengths: Vec<_> = slices.iter().map(|s| s.length / MIB).collect();
/// assert_eq!(lengths, [5, 5, 2]);
/// ```
#[must_use]
pub fn plan_slices(len: u64, part_size: u64) -> Vec<FileSlice> {
    if len == 0 || part_size == 0 {
        return Vec::new();
    }
    let count = len.div_ceil(part_size);
    (0..count)
        .map(|i| {
            let offset = i * part_size;
            FileSlice {
                part_number: u32::try_from(i + 1).unwrap_or(u32::MAX),
                offset,
                length: part_size.min(len - offset),
            }
        })
        .collect()
}

/// Uploads a local file as consecutive fixed-size parts.
///
/// Each part is read from disk right before it is sent; the file must not
/// change while the upload runs.
#[derive(Debug, Clone)]
pub struct FileSlices {
    path: PathBuf,
    part_size: u64,
}

impl FileSlices {
    /// Slice `path` into parts of the default size (5 MiB).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_part_size(path, DEFAULT_PART_SIZE)
    }

    /// Slice `path` into parts of `part_size` bytes.
    #[must_use]
    pub fn with_part_size(path: impl Into<PathBuf>, part_size: u64) -> Self {
        Self {
            path: path.into(),
            part_size,
        }
    }

    /// The file being uploaded.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured part size.
    #[must_use]
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    async fn file_len(&self) -> std::io::Result<u64> {
        let meta = tokio::fs::metadata(&self.path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        Ok(meta.len())
    }
}

#[async_trait]
impl PartSource for FileSlices {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn validate(&self, limits: &PartLimits) -> Result<(), UploadError> {
        if self.part_size == 0 || self.part_size > limits.max_part_size {
            return Err(UploadError::Validation(format!(
                "part size {} is outside 1..={}",
                self.part_size, limits.max_part_size
            )));
        }

        let len = self.file_len().await.map_err(|e| {
            UploadError::Validation(format!("{}: {e}", self.path.display()))
        })?;
        if len == 0 {
            return Err(UploadError::Validation(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        limits.check_total(len)?;

        let count = usize::try_from(len.div_ceil(self.part_size)).unwrap_or(usize::MAX);
        limits.check_count(count)?;
        // Only the first slice can be a short non-last part.
        limits.check_size(0, count, self.part_size.min(len))
    }

    async fn upload_parts(self, ctx: &PartContext<'_>) -> Result<Vec<CompletedPart>, FailureCause> {
        let len = self.file_len().await.map_err(|source| FailureCause::Io {
            part_number: part_number(0),
            source,
        })?;

        let slices = plan_slices(len, self.part_size);
        let mut parts = Vec::with_capacity(slices.len());
        for slice in slices {
            ctx.check_cancelled()?;
            let data = read_range(&self.path, slice.offset, slice.length)
                .await
                .map_err(|source| FailureCause::Io {
                    part_number: slice.part_number,
                    source,
                })?;
            parts.push(
                ctx.upload_part(slice.part_number, RequestBody::from_bytes(data))
                    .await?,
            );
        }
        Ok(parts)
    }
}

//! S3 multipart protocol limits.
//!
//! These values are fixed by the S3 protocol and honoured by every
//! compatible backend (AWS S3, Tencent COS, Aliyun OSS, Huawei OBS, MinIO).
//! See <https://docs.aws.amazon.com/AmazonS3/latest/userguide/qfacts.html>.

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Minimum size of every part except the last one (5 MiB).
pub const MIN_PART_SIZE: u64 = 5 * MIB;

/// Maximum size of a single part (5 GiB).
pub const MAX_PART_SIZE: u64 = 5 * 1024 * MIB;

/// Maximum number of parts in one multipart upload.
pub const MAX_PARTS: usize = 10_000;

/// Lowest valid part number.
pub const MIN_PART_NUMBER: u32 = 1;

/// Highest valid part number.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Maximum size of a single object (5 TiB).
pub const MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * MIB;

/// Part size used when the caller does not pick one.
pub const DEFAULT_PART_SIZE: u64 = MIN_PART_SIZE;

/// Largest upload size for which a single `PutObject` is preferred.
///
/// Files at or above this size go through multipart upload.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 80 * MIB;

/// Maximum number of parts returned by one `ListParts` page.
pub const LIST_PARTS_PAGE_SIZE: usize = 1_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_keep_limits_consistent() {
        const _: () = assert!(MAX_PART_SIZE > MIN_PART_SIZE);
        const _: () = assert!(MAX_OBJECT_SIZE > MAX_PART_SIZE);
        const _: () = assert!(DEFAULT_PART_SIZE >= MIN_PART_SIZE);

        assert_eq!(MAX_PARTS, MAX_PART_NUMBER as usize);
        assert!(MAX_PART_SIZE * MAX_PARTS as u64 >= MAX_OBJECT_SIZE);
    }
}

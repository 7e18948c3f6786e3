//! Server-side composition of existing objects.
//!
//! Source objects are named by their intended position (`chunks/1`,
//! `chunks/2`, ...). They are sorted by that number and copied into the
//! destination with `UploadPartCopy`, so no data passes through the client.

use async_trait::async_trait;
use stowage_model::{CompletedPart, ObjectSummary};

use super::{PartContext, PartLimits, PartSource};
use crate::error::{FailureCause, UploadError};

/// Default ordering key: the last `/`-separated segment parsed as a number.
///
/// # Examples
///
/// ```
/// use stowage_core::source::default_ordering_key;
///
/// assert_eq!(default_ordering_key("chunks/abc/7"), Some(7));
/// assert_eq!(default_ordering_key("12"), Some(12));
/// assert_eq!(default_ordering_key("chunks/part-1"), None);
/// ```
#[must_use]
pub fn default_ordering_key(key: &str) -> Option<u32> {
    key.rsplit('/').next()?.parse().ok()
}

/// One source object of a composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposePart {
    /// Source object key.
    pub key: String,
    /// Part number derived from the key.
    pub part_number: u32,
    /// Object size, when known from a listing.
    pub size: Option<u64>,
}

/// Copies existing objects of one bucket into the parts of a new object.
#[derive(Debug, Clone)]
pub struct ComposeSource {
    source_bucket: String,
    parts: Vec<ComposePart>,
}

impl ComposeSource {
    /// Compose `keys` ordered by [`default_ordering_key`].
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::CopySource`] for the first key without a
    /// numeric ordering key.
    pub fn from_keys<I, K>(source_bucket: impl Into<String>, keys: I) -> Result<Self, UploadError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::from_keys_with(source_bucket, keys, default_ordering_key)
    }

    /// Compose `keys` ordered by a caller-supplied ordering key.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::CopySource`] for the first key `ordering_key`
    /// cannot map to a number.
    pub fn from_keys_with<I, K, F>(
        source_bucket: impl Into<String>,
        keys: I,
        ordering_key: F,
    ) -> Result<Self, UploadError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        F: Fn(&str) -> Option<u32>,
    {
        let parts = keys
            .into_iter()
            .map(|key| {
                let key = key.into();
                match ordering_key(&key) {
                    Some(part_number) => Ok(ComposePart {
                        key,
                        part_number,
                        size: None,
                    }),
                    None => Err(UploadError::CopySource { key }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_parts(source_bucket, parts))
    }

    /// Compose listed objects ordered by [`default_ordering_key`], keeping
    /// their sizes for validation.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::CopySource`] for the first key without a
    /// numeric ordering key.
    pub fn from_objects(
        source_bucket: impl Into<String>,
        objects: impl IntoIterator<Item = ObjectSummary>,
    ) -> Result<Self, UploadError> {
        let parts = objects
            .into_iter()
            .map(|obj| match default_ordering_key(&obj.key) {
                Some(part_number) => Ok(ComposePart {
                    key: obj.key,
                    part_number,
                    size: Some(obj.size),
                }),
                None => Err(UploadError::CopySource { key: obj.key }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_parts(source_bucket, parts))
    }

    fn from_parts(source_bucket: impl Into<String>, mut parts: Vec<ComposePart>) -> Self {
        parts.sort_by_key(|p| p.part_number);
        Self {
            source_bucket: source_bucket.into(),
            parts,
        }
    }

    /// Bucket holding the source objects.
    #[must_use]
    pub fn source_bucket(&self) -> &str {
        &self.source_bucket
    }

    /// Source objects in part order.
    #[must_use]
    pub fn parts(&self) -> &[ComposePart] {
        &self.parts
    }

    /// Number of source objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether there are no source objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The only source key, when exactly one object is composed.
    #[must_use]
    pub fn single_source(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [only] => Some(&only.key),
            _ => None,
        }
    }
}

#[async_trait]
impl PartSource for ComposeSource {
    fn kind(&self) -> &'static str {
        "compose"
    }

    async fn validate(&self, limits: &PartLimits) -> Result<(), UploadError> {
        let count = self.parts.len();
        limits.check_count(count)?;

        for (index, part) in self.parts.iter().enumerate() {
            let expected = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if part.part_number != expected {
                return Err(UploadError::Validation(format!(
                    "copy sources must be numbered 1..={count} without gaps; \
                     '{}' maps to part {} where {expected} was expected",
                    part.key, part.part_number
                )));
            }
            if let Some(size) = part.size {
                limits.check_size(index, count, size)?;
            }
        }
        Ok(())
    }

    async fn upload_parts(self, ctx: &PartContext<'_>) -> Result<Vec<CompletedPart>, FailureCause> {
        let mut completed = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            completed.push(
                ctx.upload_part_copy(&self.source_bucket, &part.key, part.part_number)
                    .await?,
            );
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use stowage_model::limits::MIB;

    use super::*;

    #[test]
    fn test_should_sort_sources_numerically() {
        let keys = ["10", "2", "1", "3", "4", "5", "6", "7", "8", "9"];
        let source = ComposeSource::from_keys("src", keys).expect("numeric keys");
        let order: Vec<_> = source.parts().iter().map(|p| p.part_number).collect();
        assert_eq!(order, (1..=10).collect::<Vec<_>>());
        assert_eq!(source.parts()[9].key, "10");
    }

    #[test]
    fn test_should_reject_non_numeric_key() {
        let err = ComposeSource::from_keys("src", ["1", "two"]).expect_err("non-numeric key");
        assert!(matches!(err, UploadError::CopySource { key } if key == "two"));
    }

    #[test]
    fn test_should_use_custom_ordering_key() {
        let source = ComposeSource::from_keys_with("src", ["b-part2", "a-part1"], |k| {
            k.rsplit("part").next()?.parse().ok()
        })
        .expect("custom key");
        assert_eq!(source.parts()[0].key, "a-part1");
    }

    #[test]
    fn test_should_detect_single_source() {
        let single = ComposeSource::from_keys("src", ["chunks/1"]).expect("numeric");
        assert_eq!(single.single_source(), Some("chunks/1"));
        let many = ComposeSource::from_keys("src", ["1", "2"]).expect("numeric");
        assert_eq!(many.single_source(), None);
    }

    #[tokio::test]
    async fn test_should_reject_gaps_and_duplicates() {
        let limits = PartLimits::default();
        let gap = ComposeSource::from_keys("src", ["1", "3"]).expect("numeric");
        assert!(gap.validate(&limits).await.is_err());

        let dup = ComposeSource::from_keys("src", ["a/1", "b/1"]).expect("numeric");
        assert!(dup.validate(&limits).await.is_err());

        let zero = ComposeSource::from_keys("src", ["0", "1"]).expect("numeric");
        assert!(zero.validate(&limits).await.is_err());
    }

    #[tokio::test]
    async fn test_should_check_known_sizes() {
        let small = ComposeSource::from_objects(
            "src",
            [ObjectSummary::new("1", MIB), ObjectSummary::new("2", MIB)],
        )
        .expect("numeric");
        assert!(small.validate(&PartLimits::default()).await.is_err());

        let ok = ComposeSource::from_objects(
            "src",
            [ObjectSummary::new("1", 5 * MIB), ObjectSummary::new("2", MIB)],
        )
        .expect("numeric");
        assert!(ok.validate(&PartLimits::default()).await.is_ok());
    }
}

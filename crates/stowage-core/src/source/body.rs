//! Pre-chunked request bodies.

use async_trait::async_trait;
use stowage_model::CompletedPart;

use super::{PartContext, PartLimits, PartSource, part_number};
use crate::body::RequestBody;
use crate::error::{FailureCause, UploadError};

/// Uploads a list of bodies as parts `1..=N`, in list order.
///
/// Every body except the last must declare its length up front so the
/// 5 MiB floor can be checked before anything is sent.
#[derive(Debug)]
pub struct BodyList {
    bodies: Vec<RequestBody>,
}

impl BodyList {
    /// Wrap `bodies`; part numbers follow list position.
    #[must_use]
    pub fn new(bodies: Vec<RequestBody>) -> Self {
        Self { bodies }
    }

    /// Number of bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl FromIterator<RequestBody> for BodyList {
    fn from_iter<I: IntoIterator<Item = RequestBody>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[async_trait]
impl PartSource for BodyList {
    fn kind(&self) -> &'static str {
        "bodies"
    }

    async fn validate(&self, limits: &PartLimits) -> Result<(), UploadError> {
        let count = self.bodies.len();
        limits.check_count(count)?;

        for (index, body) in self.bodies.iter().enumerate() {
            match body.content_length() {
                Some(len) => limits.check_size(index, count, len)?,
                None if index + 1 < count => {
                    return Err(UploadError::Validation(format!(
                        "part {} has an unknown length; only the last part may",
                        index + 1
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn upload_parts(self, ctx: &PartContext<'_>) -> Result<Vec<CompletedPart>, FailureCause> {
        let mut parts = Vec::with_capacity(self.bodies.len());
        for (index, body) in self.bodies.into_iter().enumerate() {
            parts.push(ctx.upload_part(part_number(index), body).await?);
        }
        Ok(parts)
    }
}

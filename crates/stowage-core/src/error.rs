//! Error types for uploads and the object-store facade.
//!
//! Every multipart failure after initiation is reported together with the
//! outcome of the cleanup that followed it:
//!
//! - [`UploadError::Aborted`]: the upload failed and storage is confirmed
//!   clean.
//! - [`UploadError::AbortIncomplete`]: the upload failed and parts may still
//!   be held (and billed) by the service.
//!
//! Callers must treat the two differently; [`UploadError::cleanup_confirmed`]
//! tells them apart.

use stowage_model::{PartOrderError, UploadSession, UploadState};

use crate::client::ClientError;

/// Why an initiated upload could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum FailureCause {
    /// An `UploadPart` / `UploadPartCopy` call failed.
    #[error("part {part_number} failed: {source}")]
    PartUpload {
        /// The part that failed.
        part_number: u32,
        /// The remote error.
        source: ClientError,
    },

    /// `CompleteMultipartUpload` was rejected.
    #[error("finalize failed: {0}")]
    Finalize(ClientError),

    /// Reading a local part body failed.
    #[error("reading part {part_number} failed: {source}")]
    Io {
        /// The part being read.
        part_number: u32,
        /// The I/O error.
        source: std::io::Error,
    },

    /// The produced part list does not satisfy the `1..=N` rule.
    #[error("invalid part list: {0}")]
    PartOrder(#[from] PartOrderError),

    /// The caller cancelled the upload.
    #[error("upload cancelled")]
    Cancelled,
}

/// Errors of one multipart upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Local precondition failed; nothing was sent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A compose source key does not carry a numeric ordering key.
    #[error("cannot derive a part number from copy source key '{key}'")]
    CopySource {
        /// The offending source key.
        key: String,
    },

    /// `CreateMultipartUpload` failed; no session exists.
    #[error("initiating upload of {bucket}/{key} failed: {source}")]
    Initiation {
        /// Target bucket.
        bucket: String,
        /// Target key.
        key: String,
        /// The remote error.
        source: ClientError,
    },

    /// The upload failed and the session was aborted; no parts remain.
    #[error("{session} failed and was aborted after {attempts} attempt(s): {cause}")]
    Aborted {
        /// The aborted session.
        session: UploadSession,
        /// The failure that triggered the abort.
        cause: FailureCause,
        /// Number of abort calls issued.
        attempts: u32,
    },

    /// The upload failed and cleanup could not be confirmed.
    #[error(
        "{session} failed and cleanup is unconfirmed ({}): {cause}",
        describe_remaining(.remaining_parts, .abort_error)
    )]
    AbortIncomplete {
        /// The session that may still hold parts.
        session: UploadSession,
        /// The failure that triggered the abort.
        cause: FailureCause,
        /// Parts still listed on the last check, when a listing succeeded.
        remaining_parts: Option<usize>,
        /// The abort or list error that ended cleanup, if any.
        abort_error: Option<ClientError>,
    },
}

impl UploadError {
    /// Whether storage is known to hold nothing from this upload.
    ///
    /// `true` for every error except [`UploadError::AbortIncomplete`].
    #[must_use]
    pub fn cleanup_confirmed(&self) -> bool {
        !matches!(self, Self::AbortIncomplete { .. })
    }

    /// The session left behind, if the upload got past initiation.
    #[must_use]
    pub fn session(&self) -> Option<&UploadSession> {
        match self {
            Self::Aborted { session, .. } | Self::AbortIncomplete { session, .. } => Some(session),
            _ => None,
        }
    }

    /// The failure that triggered cleanup, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Self::Aborted { cause, .. } | Self::AbortIncomplete { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Terminal state of the upload state machine for this error.
    #[must_use]
    pub fn terminal_state(&self) -> UploadState {
        match self {
            // Initiation failure never left `Idle`; it is reported as a
            // failed precondition of the session.
            Self::Validation(_) | Self::CopySource { .. } | Self::Initiation { .. } => {
                UploadState::ValidationFailed
            }
            Self::Aborted { .. } => UploadState::Aborted,
            Self::AbortIncomplete { .. } => UploadState::AbortFailed,
        }
    }
}

#[allow(clippy::ref_option)]
fn describe_remaining(remaining: &Option<usize>, abort_error: &Option<ClientError>) -> String {
    match (remaining, abort_error) {
        (_, Some(err)) => err.to_string(),
        (Some(n), None) => format!("{n} part(s) still listed"),
        (None, None) => "parts may remain".to_owned(),
    }
}

/// Errors of the [`ObjectStore`](crate::store::ObjectStore) facade.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An argument was rejected before any remote call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single remote call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Local file system access failed.
    #[error("{path}: {source}")]
    Io {
        /// Path involved.
        path: String,
        /// The I/O error.
        source: std::io::Error,
    },

    /// A multipart upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// A CORS document could not be parsed.
    #[error("invalid CORS configuration: {0}")]
    Cors(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it concerns.
    #[must_use]
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Whether storage is known to hold nothing left over from this failure.
    #[must_use]
    pub fn cleanup_confirmed(&self) -> bool {
        match self {
            Self::Upload(err) => err.cleanup_confirmed(),
            _ => true,
        }
    }
}

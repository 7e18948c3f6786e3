//! Multipart upload lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one multipart upload invocation.
///
/// ```text
/// Idle -> Initiated -> PartsInFlight -> Completed
///   |         |              |
///   |         +--------------+--> Aborting -> Aborted
///   |                                      \-> AbortFailed
///   +--> ValidationFailed
/// ```
///
/// Once `Initiated` has been entered the upload can only end in
/// `Completed`, `Aborted` or `AbortFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadState {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// `CreateMultipartUpload` succeeded.
    Initiated,
    /// Parts are being uploaded.
    PartsInFlight,
    /// `CompleteMultipartUpload` succeeded.
    Completed,
    /// A failure occurred and the upload is being aborted.
    Aborting,
    /// Abort confirmed: no parts remain.
    Aborted,
    /// Abort could not be confirmed; parts may remain in storage.
    AbortFailed,
    /// Local validation rejected the input before any remote call.
    ValidationFailed,
}

impl UploadState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use UploadState::{
            AbortFailed, Aborted, Aborting, Completed, Idle, Initiated, PartsInFlight,
            ValidationFailed,
        };
        matches!(
            (self, next),
            (Idle, Initiated | ValidationFailed)
                | (Initiated, PartsInFlight | Aborting)
                | (PartsInFlight, Completed | Aborting)
                | (Aborting, Aborted | AbortFailed)
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Aborted | Self::AbortFailed | Self::ValidationFailed
        )
    }

    /// State name as used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initiated => "initiated",
            Self::PartsInFlight => "parts_in_flight",
            Self::Completed => "completed",
            Self::Aborting => "aborting",
            Self::Aborted => "aborted",
            Self::AbortFailed => "abort_failed",
            Self::ValidationFailed => "validation_failed",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

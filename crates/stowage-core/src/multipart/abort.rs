//! Abort-and-verify policy and outcome.

use std::time::Duration;

use crate::client::ClientError;

/// Upper bound on the delay between two abort attempts.
pub const MAX_ABORT_BACKOFF: Duration = Duration::from_secs(5);

/// How hard to try before declaring cleanup unconfirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl Default for AbortPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200))
    }
}

impl AbortPolicy {
    /// Allow `max_attempts` abort calls (at least one), waiting
    /// `initial_backoff` after the first, doubling up to [`MAX_ABORT_BACKOFF`].
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Maximum number of abort calls.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `attempt`-th abort call (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use stowage_core::multipart::AbortPolicy;
    ///
    /// let policy = AbortPolicy::new(10, Duration::from_millis(100));
    /// assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
    /// assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    /// assert_eq!(policy.backoff_for(9), Duration::from_secs(5));
    /// ```
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << shift)
            .min(MAX_ABORT_BACKOFF)
    }
}

/// Result of one abort-and-verify cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortOutcome {
    /// The service lists no parts for the upload any more.
    Clean {
        /// Abort calls issued.
        attempts: u32,
    },
    /// Cleanup could not be confirmed.
    Incomplete {
        /// Abort calls issued.
        attempts: u32,
        /// Parts still listed on the last successful check.
        remaining_parts: Option<usize>,
        /// The abort or list error that ended the cycle.
        error: Option<ClientError>,
    },
}

impl AbortOutcome {
    /// Whether no parts remain.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean { .. })
    }

    /// Abort calls issued.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Clean { attempts } | Self::Incomplete { attempts, .. } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_require_at_least_one_attempt() {
        assert_eq!(AbortPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn test_should_cap_backoff() {
        let policy = AbortPolicy::new(50, Duration::from_secs(1));
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(40), MAX_ABORT_BACKOFF);
    }
}

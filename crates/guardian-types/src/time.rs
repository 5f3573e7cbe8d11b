//! Timestamp type used throughout the engine.
//!
//! Timestamps are Unix epoch seconds (UTC). Voting deadlines, vote cast times
//! and treasury execution times all use this resolution.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub const fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Current system time. A clock set before the epoch reads as the epoch.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// This timestamp shifted forward by `secs`.
    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether `now` is strictly after this timestamp.
    pub fn is_before(&self, now: Timestamp) -> bool {
        self.0 < now.0
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_and_elapsed() {
        let t = Timestamp::new(100);
        assert_eq!(t.plus_secs(50), Timestamp::new(150));
        assert_eq!(t.elapsed_since(Timestamp::new(160)), 60);
        assert_eq!(t.elapsed_since(Timestamp::new(10)), 0);
        assert_eq!(Timestamp::new(u64::MAX).plus_secs(1), Timestamp::new(u64::MAX));
    }

    #[test]
    fn test_is_before() {
        let deadline = Timestamp::new(1_000);
        assert!(!deadline.is_before(Timestamp::new(999)));
        assert!(!deadline.is_before(Timestamp::new(1_000)));
        assert!(deadline.is_before(Timestamp::new(1_001)));
    }

    #[test]
    fn test_now_is_after_epoch() {
        assert!(Timestamp::now() > Timestamp::EPOCH);
    }
}

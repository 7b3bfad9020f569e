//! Deadline for a single remote call.

use std::time::Duration;

/// Validated per-call deadline.
///
/// # Valid Range
///
/// - Minimum: 1 millisecond (zero would time out before the publish happens)
/// - Maximum: 10 minutes (bounds how long an HTTP handler can be parked)
/// - Default: 30 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeout(Duration);

impl CallTimeout {
    const DEFAULT: Duration = Duration::from_secs(30);
    const MIN: Duration = Duration::from_millis(1);
    const MAX: Duration = Duration::from_secs(600);

    /// Create a timeout, rejecting values outside the valid range.
    pub fn new(duration: Duration) -> Result<Self, String> {
        if duration < Self::MIN {
            return Err(format!(
                "timeout must be at least {:?}, got {:?}",
                Self::MIN,
                duration
            ));
        }
        if duration > Self::MAX {
            return Err(format!(
                "timeout must be at most {:?}, got {:?}",
                Self::MAX,
                duration
            ));
        }
        Ok(Self(duration))
    }

    pub fn from_millis(millis: u64) -> Result<Self, String> {
        Self::new(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Default for CallTimeout {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_is_thirty_seconds() {
        assert_eq!(CallTimeout::default().as_duration(), Duration::from_secs(30));
    }

    #[rstest]
    #[case(1)]
    #[case(100)]
    #[case(30_000)]
    #[case(600_000)]
    fn accepts_values_in_range(#[case] millis: u64) {
        let timeout = CallTimeout::from_millis(millis).unwrap();
        assert_eq!(timeout.as_duration(), Duration::from_millis(millis));
    }

    #[rstest]
    #[case(0)]
    #[case(600_001)]
    fn rejects_values_out_of_range(#[case] millis: u64) {
        assert!(CallTimeout::from_millis(millis).is_err());
    }

    #[test]
    fn rejects_sub_millisecond() {
        assert!(CallTimeout::new(Duration::from_micros(500)).is_err());
    }
}

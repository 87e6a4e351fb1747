//! Retry eligibility and exponential backoff for failed downloads

use std::time::Duration;

use crate::queue::classifier::{ErrorClassifier, ErrorKind};
use crate::utils::config::AppSettings;

/// Outcome of evaluating a failure against the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue automatically after `delay`
    Retry { delay: Duration },
    /// The failure is terminal
    GiveUp,
}

/// Retry policy: `min(max_delay, base_delay * 2^retry_count)` between attempts,
/// at most `max_retries` failed attempts, never a retry for restricted content.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    classifier: ErrorClassifier,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            classifier: ErrorClassifier::default(),
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.retry_base_delay(),
            settings.retry_max_delay(),
        )
    }

    /// Replace the error classifier used by [`RetryPolicy::should_retry`]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classify(&self, error_text: &str) -> ErrorKind {
        self.classifier.classify(error_text)
    }

    /// Whether a failure with this text, after `retry_count` automatic retries,
    /// should be retried again.
    pub fn should_retry(&self, error_text: &str, retry_count: u32) -> bool {
        matches!(
            self.decide(self.classify(error_text), retry_count, self.max_retries),
            RetryDecision::Retry { .. }
        )
    }

    /// Decide what happens to a failure of `kind`, where `retry_count` already counts
    /// that failure. The item is requeued only while `retry_count < max_retries`.
    pub fn decide(&self, kind: ErrorKind, retry_count: u32, max_retries: u32) -> RetryDecision {
        if retry_count >= max_retries || !kind.is_retryable() {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.get_delay(retry_count.saturating_sub(1)),
        }
    }

    /// Backoff before the retry following `retry_count` previous retries
    pub fn get_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.get_delay(0), Duration::from_secs(5));
        assert_eq!(policy.get_delay(1), Duration::from_secs(10));
        assert_eq!(policy.get_delay(2), Duration::from_secs(20));
        assert_eq!(policy.get_delay(3), Duration::from_secs(30));
        assert_eq!(policy.get_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_survives_huge_counts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.get_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_network_errors_retry_until_exhausted() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry("Connection timed out", 0));
        assert!(policy.should_retry("Connection timed out", 2));
        assert!(!policy.should_retry("Connection timed out", 3));
        assert!(!policy.should_retry("Connection timed out", 7));
    }

    #[test]
    fn test_restricted_never_retries() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry("Private video", 0));
        assert!(!policy.should_retry("Video unavailable", 0));
        assert!(!policy.should_retry("blocked on copyright grounds", 0));
    }

    #[test]
    fn test_unclassified_errors_retry_optimistically() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry("yt-dlp exited with status 1", 0));
        assert!(policy.should_retry("HTTP Error 429: Too Many Requests", 1));
        assert!(policy.should_retry("No space left on device", 0));
        assert!(policy.should_retry("Requested format is not available", 0));
    }

    #[test]
    fn test_decide_uses_item_limit() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(ErrorKind::Network, 1, 1),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.decide(ErrorKind::Network, 2, 5),
            RetryDecision::Retry {
                delay: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn test_first_failure_waits_base_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(ErrorKind::Network, 1, 3),
            RetryDecision::Retry {
                delay: Duration::from_secs(5)
            }
        );
        assert_eq!(policy.decide(ErrorKind::Network, 3, 3), RetryDecision::GiveUp);
        assert_eq!(policy.decide(ErrorKind::Restricted, 1, 3), RetryDecision::GiveUp);
    }

    proptest! {
        #[test]
        fn delay_is_bounded_and_monotonic(count in 0u32..64) {
            let policy = RetryPolicy::default();
            let current = policy.get_delay(count);
            let next = policy.get_delay(count + 1);
            prop_assert!(current <= policy.max_delay);
            prop_assert!(current >= policy.base_delay);
            prop_assert!(next >= current);
        }
    }
}

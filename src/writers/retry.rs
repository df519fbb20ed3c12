//! Retry policy for transaction submission
//!
//! Submission uses a fixed attempt ceiling and a fixed delay between
//! attempts. Broadcast errors are classified by message text since nodes
//! report them as JSON-RPC error strings.

use std::time::Duration;

use crate::config::CeloConfig;

/// Attempts per vote or execution before giving up
pub const TX_RETRY_LIMIT: u32 = 10;

/// Delay between attempts
pub const TX_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Transaction retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of broadcast attempts
    pub max_attempts: u32,
    /// Sleep between attempts
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: TX_RETRY_LIMIT,
            interval: TX_RETRY_INTERVAL,
        }
    }
}

impl RetryConfig {
    pub fn from_config(config: &CeloConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts,
            interval: Duration::from_millis(config.retry_interval_ms),
        }
    }

    /// Check if another attempt is allowed after `attempt` (1-indexed)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Classifies broadcast errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Another transaction already used the nonce
    NonceTooLow,
    /// A pending transaction with the same nonce pays more
    Underpriced,
    /// Anything else, including reverts caused by another relayer having
    /// already finalized the proposal
    Other,
}

impl ErrorClass {
    /// Retry straight away with a fresh nonce and gas price
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::NonceTooLow | ErrorClass::Underpriced)
    }
}

/// Classify a node error message
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("nonce too low") {
        return ErrorClass::NonceTooLow;
    }

    if error_lower.contains("replacement transaction underpriced")
        || error_lower.contains("transaction underpriced")
    {
        return ErrorClass::Underpriced;
    }

    ErrorClass::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.interval, Duration::from_secs(2));
        assert!(config.should_retry(9));
        assert!(!config.should_retry(10));
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(classify_error("nonce too low"), ErrorClass::NonceTooLow);
        assert_eq!(
            classify_error("server returned an error response: error code -32000: Nonce too low"),
            ErrorClass::NonceTooLow
        );
        assert_eq!(
            classify_error("replacement transaction underpriced"),
            ErrorClass::Underpriced
        );
        assert_eq!(classify_error("execution reverted"), ErrorClass::Other);
        assert_eq!(classify_error("connection refused"), ErrorClass::Other);
        assert_eq!(classify_error("nonce too high"), ErrorClass::Other);
    }

    #[test]
    fn test_transient_classes() {
        assert!(ErrorClass::NonceTooLow.is_transient());
        assert!(ErrorClass::Underpriced.is_transient());
        assert!(!ErrorClass::Other.is_transient());
    }
}

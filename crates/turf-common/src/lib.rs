//! # Turf Common
//!
//! Shared plumbing for the Turf Admin service worker crates.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Error categories for structured log fields
//! - Wall-clock timestamps for cache entries and notifications

use std::time::{SystemTime, UNIX_EPOCH};

pub mod logging;

pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat};

/// Errors that can report a short, stable category.
///
/// The category is attached to log events (`category = err.category()`) so
/// failures can be grouped without parsing messages.
pub trait ErrorCategory {
    /// Get the error category.
    fn category(&self) -> &'static str;
}

/// Milliseconds since the Unix epoch.
///
/// A clock set before 1970 reads as zero.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offline;

    impl ErrorCategory for Offline {
        fn category(&self) -> &'static str {
            "offline"
        }
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Offline.category(), "offline");
    }

    #[test]
    fn test_now_millis_is_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(a > 0);
        assert!(b >= a);
    }
}

//! Dependency injection traits for ambient facilities.
//!
//! External dependencies are abstracted behind traits and injected where
//! needed, so production code and tests share the same call sites.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// Projection timestamps (`processed_at`, `recorded_at`) come from an
/// injected clock rather than `Utc::now()` calls scattered through the
/// engine, so tests can pin time.
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Utc};
/// use paperboard_core::environment::Clock;
///
/// // Test - fixed time for deterministic tests
/// struct FixedClock { time: DateTime<Utc> }
/// impl Clock for FixedClock {
///     fn now(&self) -> DateTime<Utc> {
///         self.time
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first, "system clock should never run backwards");
    }
}

//! Cache scope attached to cacheable steps.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Policy letting the execution service skip a step whose resolved inputs
/// match a prior successful run within the ttl window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheScope {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// How long a cached result stays reusable.
    pub ttl: Duration,
}

impl CacheScope {
    /// Creates an enabled cache scope with the given ttl.
    #[must_use]
    pub fn enabled(ttl: Duration) -> Self {
        Self { enabled: true, ttl }
    }

    /// Creates an enabled cache scope expiring after `days` days.
    #[must_use]
    pub fn days(days: u64) -> Self {
        Self::enabled(Duration::from_secs(days * SECONDS_PER_DAY))
    }

    /// Creates a disabled cache scope.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ttl: Duration::ZERO,
        }
    }

    /// Renders the ttl as an ISO 8601 duration (`P30D`, `PT12H`, `PT90S`).
    #[must_use]
    pub fn expire_after(&self) -> String {
        let secs = self.ttl.as_secs();
        if secs > 0 && secs % SECONDS_PER_DAY == 0 {
            format!("P{}D", secs / SECONDS_PER_DAY)
        } else if secs > 0 && secs % 3600 == 0 {
            format!("PT{}H", secs / 3600)
        } else {
            format!("PT{secs}S")
        }
    }

    /// Renders the scope as it appears in a pipeline definition.
    #[must_use]
    pub fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "Enabled": self.enabled,
            "ExpireAfter": self.expire_after(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thirty_days() {
        let scope = CacheScope::days(30);
        assert!(scope.enabled);
        assert_eq!(scope.ttl, Duration::from_secs(30 * 86_400));
        assert_eq!(scope.expire_after(), "P30D");
    }

    #[test]
    fn test_expire_after_units() {
        assert_eq!(CacheScope::enabled(Duration::from_secs(7200)).expire_after(), "PT2H");
        assert_eq!(CacheScope::enabled(Duration::from_secs(90)).expire_after(), "PT90S");
    }

    #[test]
    fn test_definition() {
        assert_eq!(
            CacheScope::days(30).to_definition(),
            serde_json::json!({"Enabled": true, "ExpireAfter": "P30D"})
        );
    }
}

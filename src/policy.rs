use crate::cache::CacheClass;
use crate::error::{ResilienceError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-route configuration for the resilience middleware.
///
/// The surface is closed: unknown keys are rejected rather than silently
/// accepted. Every field has a documented default, and the default
/// policy is a full bypass (dynamic, no dedup, no rate limit).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ResiliencePolicy {
    /// Response class; `dynamic` bypasses the cache entirely.
    pub cache: CacheClass,

    /// Overrides the class default TTL when set.
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,

    /// Coalesce concurrent identical GETs under this key prefix.
    pub deduplicate_key: Option<String>,

    /// Rate limit window; both window and max_requests must be set for
    /// the limiter to engage.
    #[serde(with = "humantime_serde")]
    pub window: Option<Duration>,

    /// Request budget per window.
    pub max_requests: Option<u32>,
}

impl ResiliencePolicy {
    /// Full bypass: no caching, no coalescing, no rate limiting.
    pub fn bypass() -> Self {
        Self::default()
    }

    pub fn cached(cache: CacheClass) -> Self {
        Self {
            cache,
            ..Self::default()
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn deduplicated(mut self, key: &str) -> Self {
        self.deduplicate_key = Some(key.to_string());
        self
    }

    pub fn rate_limited(mut self, max_requests: u32, window: Duration) -> Self {
        self.max_requests = Some(max_requests);
        self.window = Some(window);
        self
    }

    /// Effective TTL for cache stores, when the class is cacheable.
    pub fn effective_ttl(&self) -> Option<Duration> {
        if !self.cache.cacheable() {
            return None;
        }
        self.max_age.or_else(|| self.cache.default_ttl())
    }

    /// Rate limit parameters, when fully configured.
    pub fn rate_limit(&self) -> Option<(u32, Duration)> {
        match (self.max_requests, self.window) {
            (Some(max), Some(window)) => Some((max, window)),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(max_age) = self.max_age {
            if max_age.is_zero() {
                return Err(ResilienceError::InvalidPolicy(
                    "max_age must be greater than zero".to_string(),
                ));
            }
        }
        if let Some(key) = &self.deduplicate_key {
            if key.trim().is_empty() {
                return Err(ResilienceError::InvalidPolicy(
                    "deduplicate_key cannot be empty".to_string(),
                ));
            }
        }
        if let Some(window) = self.window {
            if window.is_zero() {
                return Err(ResilienceError::InvalidPolicy(
                    "rate limit window must be greater than zero".to_string(),
                ));
            }
        }
        if self.max_requests == Some(0) {
            return Err(ResilienceError::InvalidPolicy(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_a_bypass() {
        let policy = ResiliencePolicy::bypass();
        assert_eq!(policy.cache, CacheClass::Dynamic);
        assert!(policy.effective_ttl().is_none());
        assert!(policy.rate_limit().is_none());
        assert!(policy.deduplicate_key.is_none());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn max_age_overrides_class_default() {
        let policy = ResiliencePolicy::cached(CacheClass::List);
        assert_eq!(policy.effective_ttl(), Some(Duration::from_secs(30)));

        let policy = policy.with_max_age(Duration::from_secs(5));
        assert_eq!(policy.effective_ttl(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn dynamic_ignores_max_age() {
        let policy = ResiliencePolicy::bypass().with_max_age(Duration::from_secs(5));
        assert!(policy.effective_ttl().is_none());
    }

    #[test]
    fn rate_limit_requires_both_fields() {
        let policy = ResiliencePolicy {
            max_requests: Some(10),
            ..ResiliencePolicy::default()
        };
        assert!(policy.rate_limit().is_none());

        let policy = policy.rate_limited(10, Duration::from_secs(60));
        assert_eq!(policy.rate_limit(), Some((10, Duration::from_secs(60))));
    }

    #[test]
    fn validate_rejects_zero_values() {
        assert!(ResiliencePolicy::bypass()
            .rate_limited(0, Duration::from_secs(1))
            .validate()
            .is_err());
        assert!(ResiliencePolicy::bypass()
            .rate_limited(1, Duration::ZERO)
            .validate()
            .is_err());
        assert!(ResiliencePolicy::bypass()
            .deduplicated("  ")
            .validate()
            .is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: std::result::Result<ResiliencePolicy, _> =
            serde_json::from_str(r#"{"cache": "list", "surprise": true}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn durations_parse_as_humantime() {
        let policy: ResiliencePolicy =
            serde_json::from_str(r#"{"cache": "read", "max_age": "45s", "window": "1m", "max_requests": 30}"#)
                .unwrap();
        assert_eq!(policy.max_age, Some(Duration::from_secs(45)));
        assert_eq!(policy.window, Some(Duration::from_secs(60)));
    }
}

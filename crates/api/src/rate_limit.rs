//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Per-IP rate limiting for the upload endpoint using tower_governor.
//! GCRA needs no background task to replenish quota.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config keyed by peer IP, with X-RateLimit-* headers
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Off unless configured
    pub enabled: bool,
    /// Seconds between quota replenishments
    pub per_second: u64,
    /// Burst size (max requests that can be made immediately)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_second: 1,
            burst_size: 10,
        }
    }
}

impl RateLimitConfig {
    /// Tighter quota for publicly exposed deployments
    pub fn strict() -> Self {
        Self {
            enabled: true,
            per_second: 4,
            burst_size: 2,
        }
    }
}

/// Build the governor config
///
/// `None` when the quota is unusable (zero period or burst). Requires the
/// server to use `into_make_service_with_connect_info::<SocketAddr>()` so
/// the peer IP can be extracted.
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<DefaultGovernorConfig>> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_disabled() {
        let config = RateLimitConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.per_second, 1);
        assert_eq!(config.burst_size, 10);
    }

    #[test]
    fn test_strict_config() {
        let config = RateLimitConfig::strict();
        assert!(config.enabled);
        assert_eq!(config.per_second, 4);
        assert_eq!(config.burst_size, 2);
    }

    #[test]
    fn test_create_governor_config() {
        assert!(create_governor_config(&RateLimitConfig::default()).is_some());

        let broken = RateLimitConfig {
            burst_size: 0,
            ..RateLimitConfig::strict()
        };
        assert!(create_governor_config(&broken).is_none());
    }
}

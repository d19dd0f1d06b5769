//! Bearer-token auth and per-client rate limiting for the bridge API.
//!
//! Both checks are optional: with no token configured every request is
//! authenticated, and a rate limit of zero disables throttling.  Loopback
//! clients are exempt from the limiter – the body's own processes talk to
//! the bridge too and must never be throttled out of their own hardware.

use std::net::IpAddr;
use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::debug;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Security settings for the bridge server.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    /// Bearer token required on every request; `None` disables auth.
    pub token: Option<String>,
    /// Requests per minute per client IP; `0` disables rate limiting.
    pub rate_limit_per_min: u32,
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Unauthorized(&'static str),
    RateLimited,
}

/// Combined auth + rate-limit gate, shared by all request handlers.
pub struct SecurityLayer {
    token: Option<String>,
    limiter: Option<KeyedLimiter>,
}

impl SecurityLayer {
    pub fn new(cfg: SecurityConfig) -> Self {
        let limiter = NonZeroU32::new(cfg.rate_limit_per_min)
            .map(|per_min| RateLimiter::keyed(Quota::per_minute(per_min)));
        Self {
            token: cfg.token.filter(|t| !t.is_empty()),
            limiter,
        }
    }

    /// Run every check for one request.
    pub fn check(&self, client: IpAddr, authorization: Option<&str>) -> Result<(), Denial> {
        if let Some(expected) = &self.token {
            let provided = authorization
                .map(|raw| raw.strip_prefix("Bearer ").unwrap_or(raw))
                .unwrap_or("");
            if provided.is_empty() {
                return Err(Denial::Unauthorized("missing Authorization header"));
            }
            if provided != expected {
                debug!(%client, "token mismatch");
                return Err(Denial::Unauthorized("invalid token"));
            }
        }

        if let Some(limiter) = &self.limiter
            && !client.is_loopback()
            && limiter.check_key(&client).is_err()
        {
            return Err(Denial::RateLimited);
        }

        Ok(())
    }

    /// `true` when a token is configured.
    pub fn auth_enabled(&self) -> bool {
        self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> IpAddr {
        "192.168.1.50".parse().unwrap()
    }

    fn loopback() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn open_layer_accepts_anything() {
        let layer = SecurityLayer::new(SecurityConfig::default());
        assert!(layer.check(remote(), None).is_ok());
        assert!(!layer.auth_enabled());
    }

    #[test]
    fn token_required_when_configured() {
        let layer = SecurityLayer::new(SecurityConfig {
            token: Some("s3cret".into()),
            rate_limit_per_min: 0,
        });

        assert!(matches!(
            layer.check(remote(), None),
            Err(Denial::Unauthorized(_))
        ));
        assert!(matches!(
            layer.check(remote(), Some("Bearer wrong")),
            Err(Denial::Unauthorized(_))
        ));
        assert!(layer.check(remote(), Some("Bearer s3cret")).is_ok());
        // A bare token without the Bearer prefix is accepted too.
        assert!(layer.check(remote(), Some("s3cret")).is_ok());
    }

    #[test]
    fn rate_limit_throttles_chatty_remote_client() {
        let layer = SecurityLayer::new(SecurityConfig {
            token: None,
            rate_limit_per_min: 2,
        });

        assert!(layer.check(remote(), None).is_ok());
        assert!(layer.check(remote(), None).is_ok());
        assert_eq!(layer.check(remote(), None), Err(Denial::RateLimited));
    }

    #[test]
    fn loopback_is_exempt_from_rate_limit() {
        let layer = SecurityLayer::new(SecurityConfig {
            token: None,
            rate_limit_per_min: 1,
        });
        for _ in 0..10 {
            assert!(layer.check(loopback(), None).is_ok());
        }
    }

    #[test]
    fn clients_are_limited_independently() {
        let layer = SecurityLayer::new(SecurityConfig {
            token: None,
            rate_limit_per_min: 1,
        });
        let other: IpAddr = "192.168.1.51".parse().unwrap();

        assert!(layer.check(remote(), None).is_ok());
        assert_eq!(layer.check(remote(), None), Err(Denial::RateLimited));
        assert!(layer.check(other, None).is_ok());
    }
}

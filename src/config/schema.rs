//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! Every section has defaults, so an empty environment still yields a
//! runnable configuration. Values are filled in by the loader.

use std::fmt;
use std::time::Duration;

/// Root configuration for the gatekeeper server.
#[derive(Debug, Clone, Default)]
pub struct GatekeeperConfig {
    /// Listener configuration (bind host and port).
    pub listener: ListenerConfig,

    /// Database settings carried for downstream collaborators.
    pub database: DatabaseConfig,

    /// Fixed-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Event-loop lag monitoring and load shedding.
    pub overload: OverloadConfig,

    /// Body parsing, compression and HTTPS policy.
    pub security: SecurityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Host or IP to bind.
    pub host: String,

    /// TCP port. Zero lets the OS pick one.
    pub port: u16,
}

impl ListenerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
        }
    }
}

/// Database settings. Not used by the server itself.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub password: Option<Secret>,
}

/// A string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum admitted requests per key inside one window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// How often expired counters are swept, in seconds.
    pub sweep_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Body sent with every 429 response.
    pub fn message(&self) -> String {
        let hours = self.window_secs / 3600;
        if hours > 0 && self.window_secs % 3600 == 0 {
            format!(
                "You have exceeded the {} requests in {} hrs limit!",
                self.max_requests, hours
            )
        } else {
            format!(
                "You have exceeded the {} requests in {} secs limit!",
                self.max_requests, self.window_secs
            )
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 24 * 60 * 60,
            sweep_interval_secs: 600,
        }
    }
}

/// Lag monitoring and shedding thresholds.
#[derive(Debug, Clone)]
pub struct OverloadConfig {
    /// Enable load shedding.
    pub enabled: bool,

    /// Requests are shed while smoothed lag is above this.
    pub max_lag_ms: u64,

    /// Lag observers fire while smoothed lag is above this.
    pub warn_lag_ms: u64,

    /// Sampling interval of the lag monitor.
    pub check_interval_ms: u64,

    /// Smoothing factor applied when lag rises.
    pub smoothing_rise: f64,

    /// Smoothing factor applied when lag falls.
    pub smoothing_fall: f64,
}

impl OverloadConfig {
    pub fn max_lag(&self) -> Duration {
        Duration::from_millis(self.max_lag_ms)
    }

    pub fn warn_lag(&self) -> Duration {
        Duration::from_millis(self.warn_lag_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl Default for OverloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_lag_ms: 70,
            warn_lag_ms: 70,
            check_interval_ms: 500,
            smoothing_rise: 1.0 / 3.0,
            smoothing_fall: 1.0 / 3.0,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Maximum buffered JSON / form body size in bytes.
    pub body_limit_bytes: usize,

    /// Responses smaller than this are sent uncompressed.
    pub compression_min_bytes: u16,

    /// Redirect or reject plaintext requests.
    pub enforce_https: bool,

    /// Trust `X-Forwarded-Proto` from a fronting proxy. Only enable this
    /// when a proxy always overwrites the header, otherwise any client can
    /// claim https.
    pub trust_proxy: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            body_limit_bytes: 50 * 1024, // 50kb
            compression_min_bytes: 1024,
            enforce_https: true,
            trust_proxy: false,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    /// Log line format.
    pub log_format: LogFormat,

    /// Prometheus exporter bind address. Unset disables the exporter.
    pub metrics_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_message_matches_24h_limit() {
        let config = RateLimitConfig::default();
        assert_eq!(
            config.message(),
            "You have exceeded the 100 requests in 24 hrs limit!"
        );
    }

    #[test]
    fn message_falls_back_to_seconds() {
        let config = RateLimitConfig {
            max_requests: 5,
            window_secs: 90,
            ..Default::default()
        };
        assert_eq!(config.message(), "You have exceeded the 5 requests in 90 secs limit!");
    }

    #[test]
    fn secret_is_redacted() {
        let db = DatabaseConfig {
            url: Some("postgres://db".into()),
            password: Some(Secret::new("hunter2")),
        };
        let rendered = format!("{:?}", db);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("postgres://db"));
    }
}

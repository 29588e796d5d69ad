//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (parsing handles syntactic)
//! - Validate value ranges (limits > 0, windows at most a year,
//!   smoothing factors in (0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatekeeperConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::GatekeeperConfig;

/// Upper bound for rate-limit windows and sweep intervals (one year).
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check value ranges across every section.
pub fn validate_config(config: &GatekeeperConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::new("listener.host", "must not be empty"));
    }

    let rl = &config.rate_limit;
    if rl.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
    }
    for (field, secs) in [
        ("rate_limit.window_secs", rl.window_secs),
        ("rate_limit.sweep_interval_secs", rl.sweep_interval_secs),
    ] {
        if secs == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        } else if secs > MAX_WINDOW_SECS {
            errors.push(ValidationError::new(
                field,
                format!("must be at most {} seconds", MAX_WINDOW_SECS),
            ));
        }
    }

    let ov = &config.overload;
    if ov.check_interval_ms == 0 {
        errors.push(ValidationError::new(
            "overload.check_interval_ms",
            "must be greater than 0",
        ));
    }
    for (field, factor) in [
        ("overload.smoothing_rise", ov.smoothing_rise),
        ("overload.smoothing_fall", ov.smoothing_fall),
    ] {
        if !(factor > 0.0 && factor <= 1.0) {
            errors.push(ValidationError::new(field, format!("{} is outside (0, 1]", factor)));
        }
    }

    if config.security.body_limit_bytes == 0 {
        errors.push(ValidationError::new(
            "security.body_limit_bytes",
            "must be greater than 0",
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&GatekeeperConfig::default()).is_ok());
    }

    #[test]
    fn window_lengths_are_bounded() {
        let mut config = GatekeeperConfig::default();
        config.rate_limit.window_secs = u64::MAX;
        config.rate_limit.sweep_interval_secs = MAX_WINDOW_SECS + 1;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            ["rate_limit.window_secs", "rate_limit.sweep_interval_secs"]
        );

        config.rate_limit.window_secs = MAX_WINDOW_SECS;
        config.rate_limit.sweep_interval_secs = MAX_WINDOW_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn smoothing_factor_range() {
        let mut config = GatekeeperConfig::default();
        config.overload.smoothing_rise = 0.0;
        config.overload.smoothing_fall = f64::NAN;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, ["overload.smoothing_rise", "overload.smoothing_fall"]);
    }
}

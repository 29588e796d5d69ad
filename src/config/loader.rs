//! Configuration loading from the process environment.
//!
//! Variables are looked up in the real environment first and then in an
//! optional `.env.{APP_ENV}` file, so the file only fills gaps. `NODE_ENV`
//! selects the file when `APP_ENV` is unset.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{GatekeeperConfig, LogFormat, Secret};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidVar {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where to look for the environment file.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Overrides `APP_ENV`.
    pub app_env: Option<String>,
    /// Overrides `CONFIG_DIR`.
    pub config_dir: Option<PathBuf>,
}

/// Load and validate configuration from the process environment.
pub fn load_from_env(options: &LoadOptions) -> Result<GatekeeperConfig, ConfigError> {
    load_with(options, |key| std::env::var(key).ok())
}

/// Load and validate configuration using `lookup` as the primary variable source.
pub fn load_with<F>(options: &LoadOptions, lookup: F) -> Result<GatekeeperConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let app_env = options
        .app_env
        .clone()
        .or_else(|| lookup("APP_ENV"))
        .or_else(|| lookup("NODE_ENV"))
        .unwrap_or_else(|| "development".to_string());
    let config_dir = options
        .config_dir
        .clone()
        .or_else(|| lookup("CONFIG_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let env_file = config_dir.join(format!(".env.{}", app_env));
    let file_vars = read_env_file(&env_file)?;

    let vars = Vars {
        lookup: &lookup,
        file: &file_vars,
    };
    let config = build_config(&vars)?;

    tracing::debug!(
        app_env = %app_env,
        env_file = %env_file.display(),
        from_file = file_vars.len(),
        "Environment configuration resolved"
    );

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }

    let to_error = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };

    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path).map_err(to_error)? {
        let (key, value) = item.map_err(to_error)?;
        vars.insert(key, value);
    }
    Ok(vars)
}

struct Vars<'a, F> {
    lookup: &'a F,
    file: &'a HashMap<String, String>,
}

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .or_else(|| self.file.get(key).cloned())
            .filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::InvalidVar {
                    key,
                    value: raw,
                    reason: e.to_string(),
                }),
        }
    }

    fn flag(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(ConfigError::InvalidVar {
                    key,
                    value: raw,
                    reason: "expected a boolean".to_string(),
                }),
            },
        }
    }
}

fn build_config<F>(vars: &Vars<'_, F>) -> Result<GatekeeperConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = GatekeeperConfig::default();

    if let Some(host) = vars.get("HOST") {
        config.listener.host = host;
    }
    if let Some(port) = vars.parse("PORT")? {
        config.listener.port = port;
    }

    config.database.url = vars.get("DB_URL");
    config.database.password = vars.get("DB_PASSWORD").map(Secret::new);

    let rl = &mut config.rate_limit;
    if let Some(v) = vars.flag("RATE_LIMIT_ENABLED")? {
        rl.enabled = v;
    }
    if let Some(v) = vars.parse("RATE_LIMIT_MAX")? {
        rl.max_requests = v;
    }
    if let Some(v) = vars.parse("RATE_LIMIT_WINDOW_SECS")? {
        rl.window_secs = v;
    }
    if let Some(v) = vars.parse("RATE_LIMIT_SWEEP_SECS")? {
        rl.sweep_interval_secs = v;
    }

    let ov = &mut config.overload;
    if let Some(v) = vars.flag("SHED_ENABLED")? {
        ov.enabled = v;
    }
    if let Some(v) = vars.parse("LAG_MAX_MS")? {
        ov.max_lag_ms = v;
    }
    if let Some(v) = vars.parse("LAG_WARN_MS")? {
        ov.warn_lag_ms = v;
    }
    if let Some(v) = vars.parse("LAG_CHECK_INTERVAL_MS")? {
        ov.check_interval_ms = v;
    }
    if let Some(v) = vars.parse("LAG_SMOOTHING_RISE")? {
        ov.smoothing_rise = v;
    }
    if let Some(v) = vars.parse("LAG_SMOOTHING_FALL")? {
        ov.smoothing_fall = v;
    }

    let sec = &mut config.security;
    if let Some(v) = vars.parse("BODY_LIMIT_BYTES")? {
        sec.body_limit_bytes = v;
    }
    if let Some(v) = vars.parse("COMPRESSION_MIN_BYTES")? {
        sec.compression_min_bytes = v;
    }
    if let Some(v) = vars.flag("HTTPS_ENFORCE")? {
        sec.enforce_https = v;
    }
    if let Some(v) = vars.flag("TRUST_PROXY")? {
        sec.trust_proxy = v;
    }

    if let Some(v) = vars.parse("REQUEST_TIMEOUT_SECS")? {
        config.timeouts.request_secs = v;
    }

    if let Some(format) = vars.get("LOG_FORMAT") {
        config.observability.log_format = match format.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            _ => {
                return Err(ConfigError::InvalidVar {
                    key: "LOG_FORMAT",
                    value: format,
                    reason: "expected `json` or `pretty`".to_string(),
                })
            }
        };
    }
    config.observability.metrics_address = vars.get("METRICS_ADDR");

    Ok(config)
}

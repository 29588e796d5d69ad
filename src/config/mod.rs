//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment + optional .env.{APP_ENV}
//!     → loader.rs (lookup & parse)
//!     → validation.rs (semantic checks)
//!     → GatekeeperConfig (validated, immutable)
//!     → handed to the pipeline and background tasks at startup
//! ```
//!
//! # Design Decisions
//! - Config is read once; there is no runtime mutation
//! - All fields have defaults so an empty environment is tolerated
//! - Validation separates syntactic (parsing) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_from_env, load_with, ConfigError, LoadOptions};
pub use schema::{
    DatabaseConfig, GatekeeperConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    OverloadConfig, RateLimitConfig, Secret, SecurityConfig, TimeoutConfig,
};

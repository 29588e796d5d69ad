//! Gatekeeper: an HTTP server bootstrap with admission control.
//!
//! Every request passes a fixed pipeline (CORS, sanitization, body parsing,
//! compression, security headers, rate limiting, overload shedding, HTTPS
//! enforcement) before it reaches the application.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatekeeperConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (answer pre-flight, add CORS headers)
//!     → sanitize.rs (escape markup in the query string)
//!     → [body parsing, compression]
//!     → headers.rs (hardening response headers)
//!     → rate_limit.rs (per-client fixed window)
//!     → [overload shedding]
//!     → https.rs (redirect or refuse plaintext)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Each stage either passes the request on or writes a final response
//! - No trust in client input

pub mod cors;
pub mod headers;
pub mod https;
pub mod rate_limit;
pub mod sanitize;

pub use https::HttpsPolicy;
pub use rate_limit::{Decision, FixedWindowLimiter, RateLimiterState};

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Lag monitor → Server → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: background tasks first, listener last
//! - A failed bind leaves the process running, degraded

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;

//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Background:
//!     lag.rs (sample runtime lag, smooth, notify observers)
//!
//! Per request:
//!     → shedding.rs (read lag, reject with 503 above the busy threshold)
//! ```
//!
//! # Design Decisions
//! - The gate reads a published sample and never measures on the request path
//! - Warn threshold and shedding threshold are independent settings
//! - Missing measurements fail open

pub mod lag;
pub mod shedding;

pub use lag::{LagMonitor, LagSource, ManualLag};
pub use shedding::OverloadGate;

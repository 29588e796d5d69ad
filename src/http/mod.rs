//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, transport layers)
//!     → request.rs (request ID)
//!     → pipeline.rs (admission stages, body.rs parses bodies)
//!     → application router (404 fallback when none is supplied)
//!     → response.rs (fixed rejection responses from any stage)
//! ```

pub mod body;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use body::ParsedBody;
pub use pipeline::{Pipeline, STAGES};
pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;

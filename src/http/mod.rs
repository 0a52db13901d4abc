//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → server.rs (route, preflight, resolve target, read body)
//!     → upstream::client (outbound fetch)
//!     → pipeline.rs (header filter, content-type branch, rewriters)
//!     → response to client
//! ```

pub mod pipeline;
pub mod server;

pub use server::{AppState, HttpServer};

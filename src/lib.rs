//! Browsing proxy library.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                 BROWSING PROXY                    │
//!                    │                                                   │
//!   Client Request   │  ┌────────┐   ┌──────────┐   ┌────────────────┐  │
//!   ─────────────────┼─▶│  http  │──▶│  codec   │──▶│    upstream    │──┼──▶ Origin
//!                    │  │ server │   │ resolver │   │   dispatcher   │  │    Server
//!                    │  └────────┘   └──────────┘   └───────┬────────┘  │
//!                    │                                      │           │
//!                    │                                      ▼           │
//!   Client Response  │  ┌────────┐   ┌──────────┐   ┌────────────────┐  │
//!   ◀────────────────┼──│  http  │◀──│ rewrite  │◀──│    charset     │  │
//!                    │  │pipeline│   │ html/css │   │    detector    │  │
//!                    │  └────────┘   └──────────┘   └────────────────┘  │
//!                    │                                                   │
//!                    │  cross-cutting: config · error · observability    │
//!                    └──────────────────────────────────────────────────┘
//! ```
//!
//! Every URL the rewriters emit routes back through the proxy, so a browser
//! that enters through one page can keep navigating, to any origin reached
//! transitively, without ever contacting an upstream directly.

// Core subsystems
pub mod codec;
pub mod http;
pub mod rewrite;
pub mod upstream;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;

pub use config::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use http::HttpServer;

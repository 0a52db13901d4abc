//! URL addressing subsystem.
//!
//! # Data Flow
//! ```text
//! content reference ("/a", "https://x/y", "//cdn/z")
//!     → urls.rs (resolve against upstream base, emit proxy-local path form)
//!
//! inbound request (path + raw query + headers)
//!     → resolver.rs (path form → query form → Referer fallback)
//!     → absolute upstream Url
//! ```
//!
//! # Design Decisions
//! - Path form is the primary encoding: it is self-describing, so bare
//!   subresource requests decode without server-side state
//! - The raw query string travels verbatim; it is never round-tripped
//!   through a parsed map
//! - Encoding an already-proxy-local URL yields the identical string

pub mod resolver;
pub mod urls;

pub use resolver::{resolve_target, TargetSource};
pub use urls::{encode, ProxyBase};

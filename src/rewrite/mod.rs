//! Content rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! upstream body bytes + Content-Type
//!     → charset.rs (pick decoder, produce text)
//!     → html.rs (attributes, hostile metas, head injection)  |  css.rs (url(...) refs)
//!     → codec::urls (every reference re-addressed through the proxy)
//! ```
//!
//! All rewriters are pure functions of their inputs; failures never
//! propagate past the response pipeline, which falls back to the original
//! bytes.

pub mod charset;
pub mod css;
pub mod html;
pub mod shim;

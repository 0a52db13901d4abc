//! Outbound request dispatch subsystem.

pub mod client;

pub use client::{UpstreamClient, UpstreamResponse};

//! RDP probe host
//!
//! This library implements the host side of the RDP telemetry protocol: it
//! discovers a data-logging server over UDP multicast, completes a
//! single-round-trip handshake, and streams per-channel sensor readings with
//! strictly increasing epochs over an unreliable, unordered transport.

pub mod core;
pub mod engine;
pub mod network;
pub mod protocol;
pub mod sensor;
pub mod snapshot;

// Re-export commonly used items
pub use crate::core::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

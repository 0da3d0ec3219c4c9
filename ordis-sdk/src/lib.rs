//! ordis-sdk
//!
//! Wire objects, request signing, and an optional HTTP client for
//! Open Outreach Dispatch. Everything an integrating backend needs to
//! launch campaigns and read dispatch state without depending on the
//! server internals.

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;

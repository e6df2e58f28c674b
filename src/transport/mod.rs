//! Concrete [`crate::sync::SyncTransport`] implementations.
#[cfg(feature = "http")]
pub mod http;

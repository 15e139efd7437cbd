//! Mutual-TLS client for the EDS signed-document validation service.

pub mod client;

pub use client::{MtlsCredentials, OutcomeBody, ValidationClient, Validator};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

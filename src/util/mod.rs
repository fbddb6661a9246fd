//! Utility types and functions shared across the ACME server.
//!
//! - [`b64`] - base64url (no padding) encoding/decoding, per RFC 7515 §2.
//! - [`id`] - unpredictable, URL-safe entity name generation.
//! - [`sig_down`] - graceful shutdown signal handling.
//! - [`telemetry`] - `tracing` subscriber setup, with optional OTLP export.

pub mod b64;
pub mod id;
pub mod sig_down;
pub mod telemetry;

pub use id::Name;
pub use sig_down::SigDown;

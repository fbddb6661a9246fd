//! JSON wire types for the ACME HTTP surface (RFC 8555).
//!
//! Dynamic payload shapes per RFC 8555 §9.3 are modeled as one struct per
//! message kind rather than a single loosely-typed blob.

pub mod account;
pub mod authorization;
pub mod certificate;
pub mod challenge;
pub mod common;
pub mod directory;
pub mod identifier;
pub mod jose;
pub mod order;

pub use common::{is_false, LocationResource, ResourceStatus};
pub use identifier::AcmeIdentifier;

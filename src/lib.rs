//! Core Rust implementation of an ACME (RFC 8555) certificate issuance server.
//!
//! This crate provides the protocol engine a conforming ACME server is built
//! from: request-envelope verification (JWS + replay-nonce enforcement), the
//! account/order/authorization/challenge state machines and their
//! persistence contract, out-of-band challenge validation, and the
//! order-to-certificate finalization pipeline.
//!
//! # Roles
//!
//! - **Core engine**: [`envelope`] verifies every mutating request before it
//!   reaches a component; [`domain`] holds the account/order/authorization/
//!   challenge/certificate state machines; [`validator`] performs the
//!   out-of-band `http-01`/`dns-01`/`tls-alpn-01` probes.
//! - **External collaborators** (abstract interfaces, reference
//!   implementations included so the server runs standalone): [`store`] is
//!   the persistence contract, [`ca`] is the certificate-authority backend.
//! - **Transport**: [`handlers`] is a thin Axum dispatcher over the core;
//!   [`app`] assembles the shared application state.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | CLI + JSON configuration loading |
//! | [`error`] | ACME problem-document error type |
//! | [`wire`] | JSON wire types for the ACME HTTP surface |
//! | [`crypto`] | JWK resolution, signature verification, key authorizations |
//! | [`envelope`] | JWS envelope verification pipeline |
//! | [`domain`] | Nonce pool and account/order/authorization/challenge/certificate services |
//! | [`validator`] | Challenge validation backends and single-flight job queue |
//! | [`store`] | Persistence contract + in-memory reference implementation |
//! | [`ca`] | CA handler contract + self-signing reference implementation |
//! | [`directory`] | Directory document |
//! | [`trigger`] | Asynchronous CA callback webhook |
//! | [`app`] | Shared application state |
//! | [`handlers`] | HTTP endpoint handlers |
//! | [`run`] | Server bootstrap |
//! | [`util`] | Base64url, ID generation, graceful shutdown, logging setup |

pub mod app;
pub mod ca;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod run;
pub mod store;
pub mod trigger;
pub mod util;
pub mod validator;
pub mod wire;

pub use error::{AcmeError, AcmeResult};
pub use run::run;

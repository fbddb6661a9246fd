//! The core ACME state machines: the nonce pool and the
//! account/order/authorization/challenge/certificate services. Each service
//! holds an `Arc<dyn Store>` and translates HTTP-facing requests into
//! `Store` reads/writes, enforcing the data model's invariants at the point
//! of mutation.

pub mod account;
pub mod authorization;
pub mod certificate;
pub mod challenge;
pub mod nonce;
pub mod order;

pub use account::AccountService;
pub use authorization::AuthorizationService;
pub use certificate::{CertificateService, RevokeAuthorization};
pub use challenge::ChallengeService;
pub use nonce::NoncePool;
pub use order::OrderService;

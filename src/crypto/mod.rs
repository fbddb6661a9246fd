//! JWS signature verification and ACME key-authorization computation.
//!
//! Verifies client-signed requests rather than producing them, with RSA and
//! ECDSA key support.

pub mod key_authorization;
pub mod keys;

pub use key_authorization::{digest_key_authorization, key_authorization};
pub use keys::{jwk_matches_certificate_key, thumbprint, VerifyingKey};

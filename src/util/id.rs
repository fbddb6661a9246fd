//! Unpredictable, URL-safe entity names.
//!
//! Every persisted ACME entity (account, order, authorization, challenge,
//! certificate) and every nonce is keyed by a freshly generated [`Name`]:
//! 128 bits of randomness, base64url-encoded.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::util::b64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    /// Generates a new random name with 128 bits of entropy.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Name(b64::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name(value)
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_unpredictable_url_safe_names() {
        let a = Name::generate();
        let b = Name::generate();
        assert_ne!(a, b);
        assert!(a.as_str().len() >= 20);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}

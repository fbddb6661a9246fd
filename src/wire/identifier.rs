//! ACME identifier objects (RFC 8555 §9.7.7).

use serde::{Deserialize, Serialize};

pub static IDENTIFIER_TYPE_DNS: &str = "dns";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct AcmeIdentifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

impl AcmeIdentifier {
    pub fn dns(name: impl Into<String>) -> Self {
        Self { type_: IDENTIFIER_TYPE_DNS.to_string(), value: name.into() }
    }

    pub fn is_dns(&self) -> bool {
        self.type_ == IDENTIFIER_TYPE_DNS
    }

    pub fn dns_name(&self) -> Option<&str> {
        self.is_dns().then_some(self.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_identifier_roundtrip() {
        let id = AcmeIdentifier::dns("example.org");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({"type": "dns", "value": "example.org"}));
        assert_eq!(id.dns_name(), Some("example.org"));
    }
}

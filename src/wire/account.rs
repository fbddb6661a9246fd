//! ACME Account resource (RFC 8555 §7.1.2, §7.3). The account key is never
//! included in the wire representation; only its JWK thumbprint is used
//! internally.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::{is_false, LocationResource, ResourceStatus};

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountResource {
    pub status: AccountStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders: Option<String>,
    #[serde(skip)]
    pub location: Option<String>,
}

impl LocationResource for AccountResource {
    fn location_mut(&mut self) -> &mut Option<String> {
        &mut self.location
    }
}

/// `newAccount` request payload (RFC 8555 §7.3).
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewAccountPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub terms_of_service_agreed: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub only_return_existing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_account_binding: Option<Value>,
}

/// POST to `/acme/acct/{name}`: the only recognized mutation is
/// `status: "deactivated"` (RFC 8555 §7.3.6); any other shape is `malformed`.
#[derive(Serialize, Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Valid,
    Deactivated,
    Revoked,
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Valid
    }
}

impl ResourceStatus for AccountStatus {
    fn is_failure(&self) -> bool {
        !matches!(self, Self::Valid)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rfc8555_account_example() {
        let account: AccountResource = serde_json::from_value(json!({
            "status": "valid",
            "contact": ["mailto:cert-admin@example.org", "mailto:admin@example.org"],
            "termsOfServiceAgreed": true,
            "orders": "https://example.com/acme/orders/rzGoeA"
        }))
        .unwrap();

        assert_eq!(account.status, AccountStatus::Valid);
        assert_eq!(account.contact.len(), 2);
        assert!(account.terms_of_service_agreed.unwrap());
    }

    #[test]
    fn deactivate_payload_parses() {
        let update: AccountUpdatePayload =
            serde_json::from_value(json!({"status": "deactivated"})).unwrap();
        assert_eq!(update.status, Some(AccountStatus::Deactivated));
    }
}

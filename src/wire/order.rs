//! ACME Order resource (RFC 8555 §7.1.3, §7.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{LocationResource, ResourceStatus};
use super::identifier::AcmeIdentifier;
use crate::error::ProblemDocument;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderResource {
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    pub identifiers: Vec<AcmeIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProblemDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorizations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip)]
    pub location: Option<String>,
}

impl LocationResource for OrderResource {
    fn location_mut(&mut self) -> &mut Option<String> {
        &mut self.location
    }
}

/// `newOrder` request payload (RFC 8555 §7.4).
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderPayload {
    pub identifiers: Vec<AcmeIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

impl ResourceStatus for OrderStatus {
    fn is_failure(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

/// Finalize-order request payload (RFC 8555 §7.4).
#[derive(Serialize, Deserialize, Debug)]
pub struct FinalizePayload {
    /// base64url-encoded DER CSR.
    pub csr: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rfc8555_order_example() {
        let order: OrderResource = serde_json::from_value(json!({
            "status": "valid",
            "expires": "2016-01-20T14:09:07.99Z",
            "identifiers": [
                { "type": "dns", "value": "www.example.org" },
                { "type": "dns", "value": "example.org" }
            ],
            "authorizations": [
                "https://example.com/acme/authz/PAniVnsZcis",
                "https://example.com/acme/authz/r4HqLzrSrpI"
            ],
            "finalize": "https://example.com/acme/order/TOlocE8rfgo/finalize",
            "certificate": "https://example.com/acme/cert/mAt3xBGaobw"
        }))
        .unwrap();

        assert_eq!(order.status, OrderStatus::Valid);
        assert_eq!(order.identifiers.len(), 2);
        assert_eq!(order.authorizations.len(), 2);
    }

    #[test]
    fn finalize_payload_parses_csr() {
        let payload: FinalizePayload = serde_json::from_value(json!({
            "csr": "TGV0cyBFbmNyeXB0"
        }))
        .unwrap();
        assert_eq!(payload.csr, "TGV0cyBFbmNyeXB0");
    }
}

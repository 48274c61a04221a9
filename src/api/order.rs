use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`api::Order`].
///
/// See [RFC 8555 §7.1.6].
///
/// `deactivated` is not an order status in the RFC, but some servers report it for orders whose
/// authorizations were deactivated, so it is accepted as a terminal failure.
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
    Deactivated,
}

impl OrderStatus {
    /// Returns true for the terminal failure statuses.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Invalid | Self::Deactivated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ACME order object.
///
/// Represents a client's request for a certificate and is used to track the progress of that order
/// through to issuance.
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43.570360537Z",
///   "identifiers": [
///     {
///       "type": "dns",
///       "value": "acmetest.algesten.se"
///     }
///   ],
///   "authorizations": [
///     "https://example.com/acme/authz/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs"
///   ],
///   "finalize": "https://example.com/acme/finalize/7738992/18234324"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    #[serde(default)]
    pub identifiers: Vec<api::Identifier>,

    /// Uses RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    /// Uses RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizations: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl Order {
    /// Payload for a newOrder request.
    pub(crate) fn from_identifiers(identifiers: Vec<api::Identifier>) -> Self {
        Self {
            identifiers,
            ..Default::default()
        }
    }

    /// Returns all domains associated with this order.
    pub fn domains(&self) -> Vec<&str> {
        self.identifiers
            .iter()
            .map(|identifier| identifier.value.as_str())
            .collect()
    }

    /// The first authorization URL, which is the one for the primary domain.
    pub fn first_authorization(&self) -> Option<&str> {
        self.authorizations
            .as_ref()
            .and_then(|authz| authz.first())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_order_payload_omits_absent_fields() {
        let order = Order::from_identifiers(vec![api::Identifier::dns("example.org")]);
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(json, r#"{"identifiers":[{"type":"dns","value":"example.org"}]}"#);
    }

    #[test]
    fn parse_order_with_error() {
        let order: Order = serde_json::from_str(
            r#"{
                "status": "invalid",
                "identifiers": [{ "type": "dns", "value": "example.org" }],
                "error": {
                    "type": "urn:ietf:params:acme:error:unauthorized",
                    "detail": "challenge failed"
                },
                "finalize": "https://example.com/acme/finalize/1"
            }"#,
        )
        .unwrap();

        assert_eq!(order.status, Some(OrderStatus::Invalid));
        assert!(order.status.unwrap().is_failed());
        assert_eq!(order.domains(), ["example.org"]);
        assert_eq!(order.first_authorization(), None);
        assert_eq!(order.error.unwrap().short_type(), "unauthorized");
    }
}

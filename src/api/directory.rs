use serde::{Deserialize, Serialize};

/// Directory object for ACME client self-configuration.
///
/// See [RFC 8555 §7.1.1].
///
/// Only the resources needed to procure certificates are required; `revokeCert` and `keyChange`
/// are kept when the server provides them.
///
/// # Example JSON
///
/// ```json
/// {
///   "newNonce": "https://example.com/acme/new-nonce",
///   "newAccount": "https://example.com/acme/new-account",
///   "newOrder": "https://example.com/acme/new-order",
///   "revokeCert": "https://example.com/acme/revoke-cert",
///   "keyChange": "https://example.com/acme/key-change",
///   "meta": {
///     "termsOfService": "https://example.com/acme/terms/2017-5-30",
///     "caaIdentities": ["example.com"]
///   }
/// }
/// ```
///
/// [RFC 8555 §7.1.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.1
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    /// URL for new nonce requests.
    pub new_nonce: String,

    /// URL for new account requests.
    pub new_account: String,

    /// URL for new order requests.
    pub new_order: String,

    /// URL for pre-authorization requests, absent when the server does not support them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_authz: Option<String>,

    /// URL for certificate revocation requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_cert: Option<String>,

    /// URL for key change requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_change: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<DirectoryMeta>,
}

/// <https://datatracker.ietf.org/doc/html/rfc8555#section-9.7.6>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMeta {
    /// URL identifying the current terms of service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub caa_identities: Option<Vec<String>>,

    /// If true, newAccount requests must carry an external account binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_required: Option<bool>,
}

impl DirectoryMeta {
    pub fn external_account_required(&self) -> bool {
        self.external_account_required.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_directory() {
        let dir: Directory = serde_json::from_str(
            r#"{
                "newNonce": "https://ca/nonce",
                "newAccount": "https://ca/acct",
                "newOrder": "https://ca/order"
            }"#,
        )
        .unwrap();

        assert_eq!(dir.new_order, "https://ca/order");
        assert!(dir.revoke_cert.is_none());
        assert!(dir.meta.is_none());
    }
}

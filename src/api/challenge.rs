use serde::{Deserialize, Serialize};

use crate::api;

/// Challenge status, see [RFC 8555 §7.1.6].
///
/// Only a `pending` challenge may be responded to. The provider moves it to `processing` once the
/// client posts to its URL.
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// One way of proving control over an identifier, offered inside an [`api::Authorization`].
///
/// Only `http-01` ([RFC 8555 §8.3]) is answered by this crate; other types are parsed and ignored.
///
/// ```json
/// {
///   "type": "http-01",
///   "status": "pending",
///   "url": "https://example.com/acme/chall/prV_B7yEyA4",
///   "token": "LoqXcYV8q5ONbJQxbmR7SCTNo3tiAXDfowyjxAjEuX0"
/// }
/// ```
///
/// [RFC 8555 §8.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.3
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub _type: String,

    /// Where to POST `{}` once the key authorization is published.
    pub url: String,

    pub status: ChallengeStatus,

    /// RFC 3339 timestamp of successful validation.
    pub validated: Option<String>,

    /// Why validation failed.
    pub error: Option<api::Problem>,

    /// Last path segment of the validation URL, and the first half of the key authorization.
    pub token: String,
}

impl Challenge {
    pub const HTTP_01: &'static str = "http-01";

    /// Path the provider fetches for `http-01` validation.
    pub fn http_path(&self) -> String {
        format!("/.well-known/acme-challenge/{}", self.token)
    }

    pub fn is_pending(&self) -> bool {
        self.status == ChallengeStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failed_challenge() {
        let challenge: Challenge = serde_json::from_str(
            r#"{
                "type": "http-01",
                "status": "invalid",
                "url": "https://example.com/acme/chall/1",
                "token": "tok",
                "error": {
                    "type": "urn:ietf:params:acme:error:connection",
                    "detail": "connection refused"
                }
            }"#,
        )
        .unwrap();

        assert!(!challenge.is_pending());
        assert_eq!(challenge.http_path(), "/.well-known/acme-challenge/tok");
        assert_eq!(challenge.error.unwrap().short_type(), "connection");
    }
}

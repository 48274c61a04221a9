use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`api::Authorization`].
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

// {
//   "identifier": {
//     "type": "dns",
//     "value": "acmetest.algesten.se"
//   },
//   "status": "pending",
//   "expires": "2019-01-09T08:26:43Z",
//   "challenges": [
//     {
//       "type": "http-01",
//       "status": "pending",
//       "url": "https://example.com/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789597",
//       "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
//     },
//     {
//       "type": "dns-01",
//       "status": "pending",
//       "url": "https://example.com/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789599",
//       "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
//     }
//   ]
// }
/// An ACME authorization object.
///
/// Represents a server's authorization for an account to represent an identifier.
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Authorization identifier.
    pub identifier: api::Identifier,

    /// Authorization status.
    pub status: AuthorizationStatus,

    /// The timestamp after which the server will consider this authorization invalid.
    ///
    /// Uses RFC 3339 format.
    pub expires: Option<String>,

    /// The challenges the client can fulfill to prove possession of the identifier, or for
    /// valid/invalid authorizations, the challenge that was attempted.
    #[serde(default)]
    pub challenges: Vec<api::Challenge>,

    /// Present and true for authorizations of a wildcard domain name.
    pub wildcard: Option<bool>,
}

impl Authorization {
    /// Returns true if authorization was created for a wildcard domain.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard.unwrap_or(false)
    }

    /// Returns the first challenge of the given type, e.g. `http-01`.
    pub fn challenge_of_type(&self, challenge_type: &str) -> Option<&api::Challenge> {
        self.challenges.iter().find(|c| c._type == challenge_type)
    }

    /// Returns an `http-01` challenge, if one is present.
    pub fn http_challenge(&self) -> Option<&api::Challenge> {
        self.challenge_of_type(api::Challenge::HTTP_01)
    }

    /// Returns the first error reported by any of the challenges.
    pub fn challenge_error(&self) -> Option<&api::Problem> {
        self.challenges.iter().find_map(|c| c.error.as_ref())
    }
}

/// Payload asking the server to deactivate an authorization.
///
/// See [RFC 8555 §7.5.2].
///
/// [RFC 8555 §7.5.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.5.2
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deactivation {
    status: AuthorizationStatus,
}

impl Deactivation {
    pub(crate) fn new() -> Self {
        Self {
            status: AuthorizationStatus::Deactivated,
        }
    }
}

//! JSON API payloads.
//!
//! Not intended to be used directly. Provided to aid debugging.

use std::fmt;

use serde::{
    ser::{SerializeMap as _, Serializer},
    Deserialize, Serialize,
};

mod account;
mod authorization;
mod challenge;
mod directory;
mod finalize;
mod identifier;
mod order;

pub use self::{
    account::Account,
    authorization::{Authorization, AuthorizationStatus, Deactivation},
    challenge::{Challenge, ChallengeStatus},
    directory::{Directory, DirectoryMeta},
    finalize::Finalize,
    identifier::Identifier,
    order::{Order, OrderStatus},
};

/// Serializes to `""`.
///
/// Used as the payload of POST-as-GET requests.
pub struct EmptyString;

impl Serialize for EmptyString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("")
    }
}

/// Serializes to `{}`.
pub struct EmptyObject;

impl Serialize for EmptyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

/// Problem document as defined in [RFC 7807], used by ACME servers to report errors.
///
/// [RFC 7807]: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// HTTP status code the server attached to the document, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl Problem {
    /// Problem with the default `about:blank` type.
    pub(crate) fn blank(detail: impl Into<String>) -> Self {
        Self {
            _type: "about:blank".to_owned(),
            detail: Some(detail.into()),
            ..Default::default()
        }
    }

    /// Returns true if problem type is "badNonce".
    pub fn is_bad_nonce(&self) -> bool {
        self._type == "urn:ietf:params:acme:error:badNonce" || self._type == "badNonce"
    }

    /// Last segment of the problem type URN, e.g. `rateLimited`.
    pub fn short_type(&self) -> &str {
        self._type.rsplit(':').next().unwrap_or(&self._type)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            _ => write!(f, "{}", self._type),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type")]
    pub _type: String,
    pub detail: Option<String>,
    pub identifier: Option<identifier::Identifier>,
}

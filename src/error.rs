use std::fmt;

use crate::api::{self, OrderStatus};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while talking to an ACME provider.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection failure, timeout or other I/O problem before a response was read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The ACME provider rejected the request or reported the resource as failed.
    #[error(transparent)]
    Acme(#[from] AcmeError),

    /// The order is in a status that does not permit the next step.
    #[error("cannot {step} while order is {status}")]
    ProtocolState {
        step: &'static str,
        status: OrderStatus,
    },

    /// Polling gave up while the order was still in a transient status.
    #[error("order stuck in {status}, bailing out after {attempts} polls")]
    StuckPolling { status: OrderStatus, attempts: u32 },

    /// A response was missing something the protocol requires.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Local key, CSR or certificate handling failed.
    #[error(transparent)]
    Other(#[from] eyre::Report),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// The CA problem, if this error was reported by the ACME provider.
    pub fn as_acme(&self) -> Option<&AcmeError> {
        match self {
            Self::Acme(err) => Some(err),
            _ => None,
        }
    }
}

/// A problem reported by the ACME provider together with the HTTP status it came with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmeError {
    problem: api::Problem,
    http_status: u16,
}

impl AcmeError {
    pub(crate) fn new(problem: api::Problem, http_status: u16) -> Self {
        Self {
            problem,
            http_status,
        }
    }

    /// Problem type URN, e.g. `urn:ietf:params:acme:error:rateLimited`.
    pub fn problem_type(&self) -> &str {
        &self.problem._type
    }

    /// Human readable detail, if the provider sent one.
    pub fn detail(&self) -> Option<&str> {
        self.problem.detail.as_deref()
    }

    /// HTTP status of the response that carried the problem.
    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    pub fn subproblems(&self) -> &[api::Subproblem] {
        self.problem.subproblems.as_deref().unwrap_or_default()
    }

    pub fn is_bad_nonce(&self) -> bool {
        self.problem.is_bad_nonce()
    }

    pub fn problem(&self) -> &api::Problem {
        &self.problem
    }
}

impl fmt::Display for AcmeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (HTTP {})", self.problem.short_type(), self.problem, self.http_status)
    }
}

impl std::error::Error for AcmeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acme_error_display() {
        let problem = api::Problem {
            _type: "urn:ietf:params:acme:error:badNonce".to_owned(),
            detail: Some("JWS has an invalid anti-replay nonce".to_owned()),
            ..Default::default()
        };
        let err = Error::from(AcmeError::new(problem, 400));

        assert!(err.as_acme().unwrap().is_bad_nonce());
        assert_eq!(
            err.to_string(),
            "[badNonce] urn:ietf:params:acme:error:badNonce: \
             JWS has an invalid anti-replay nonce (HTTP 400)"
        );
    }

    #[test]
    fn stuck_polling_reports_status() {
        let err = Error::StuckPolling {
            status: OrderStatus::Pending,
            attempts: 10,
        };
        assert_eq!(err.to_string(), "order stuck in pending, bailing out after 10 polls");
    }
}

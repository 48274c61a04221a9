//! Procuring certificates from ACME (Automatic Certificate Management Environment) providers
//! such as [Let's Encrypt](https://letsencrypt.org/).
//!
//! It follows the [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555) spec, using ACME v2 to
//! issue/renew certificates, proving domain ownership with `http-01` challenges.
//!
//! # Usage
//!
//! - Create a [`SignedTransport`] for the provider's directory.
//! - Register (or look up) an account with [`AccountContext::register`].
//! - Call [`OrderEngine::procure`] with a domain, a CSR from [`create_csr`] and a
//!   [`ChallengeProvisioner`] that your web server reads key authorizations from.
//!
//! Or let a [`CertificateManager`] decide when a stored certificate needs replacing.
//!
//! ## Examples
//!
//! A complete usage example is provided in the source repository:
//!
//! - [`http-01` &rarr;](demos/http-01.rs)
//!
//! # Domain Ownership
//!
//! Most website TLS certificates tries to prove ownership/control over the domain they are issued
//! for. For `http-01`, this means proving you control a server answering HTTP requests for that
//! domain, on port 80, at
//!
//! ```text
//! http://<domain>/.well-known/acme-challenge/<token>
//! ```
//!
//! The order engine writes the expected response through the [`ChallengeProvisioner`] before it
//! asks the provider to validate, and removes it again once the order is done.
//!
//! # Rate Limits
//!
//! The ACME API provider Let's Encrypt uses [rate limits] to ensure the API is not being abused. It
//! might be tempting to put the delay of the [`PollPolicy`] really low, but balance this against
//! the real risk of having access cut off.
//!
//! ## Use Staging For Development!
//!
//! Especially take care to use the Let's Encrypt staging environment for development where the rate
//! limits are more relaxed. See [`DirectoryUrl::LetsEncryptStaging`].
//!
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod acc;
mod cert;
mod dir;
mod error;
mod jws;
mod manager;
mod provision;
mod req;
mod trans;

pub mod api;
pub mod order;


pub use crate::{
    acc::{AccountContext, AccountKey},
    cert::{create_csr, create_p256_key, Certificate},
    dir::{DirectoryUrl, Resource},
    error::{AcmeError, Error, Result},
    manager::{AccountSource, CertificateManager, CertificateStore},
    order::{OrderEngine, PollPolicy},
    provision::{ChallengeProvisioner, MemoryProvisioner},
    trans::{AcmeResponse, SignedTransport, Signer, Target},
};

use std::{sync::Arc, time::Duration};

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    acc::AccountKey,
    api,
    dir::{DirectoryCache, DirectoryUrl, Resource},
    error::{Error, Result},
    jws::{self, JwsProtectedHeader},
    req::{http_client, req_get, req_post},
};

/// Where a signed request is sent.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A URL handed out by the provider, e.g. an order or authorization URL.
    Url(&'a str),

    /// A resource looked up in the directory.
    Resource(Resource),
}

/// How the request is tied to the account.
///
/// The protected header carries either the full public key or the account URL, never both.
#[derive(Debug, Clone, Copy)]
pub enum Signer<'a> {
    /// Full public key; only for newAccount.
    Jwk(&'a AccountKey),

    /// Account URL returned at registration; for all other requests.
    Kid { key: &'a AccountKey, kid: &'a str },
}

impl Signer<'_> {
    fn key(&self) -> &AccountKey {
        match self {
            Signer::Jwk(key) | Signer::Kid { key, .. } => *key,
        }
    }

    fn protected_header(&self, url: &str, nonce: String) -> Result<JwsProtectedHeader> {
        Ok(match self {
            Signer::Jwk(key) => JwsProtectedHeader::new_jwk(key.jwk()?, url, nonce),
            Signer::Kid { kid, .. } => JwsProtectedHeader::new_kid(kid, url, nonce),
        })
    }
}

/// A successful response from the provider.
#[derive(Debug, Clone)]
pub struct AcmeResponse {
    pub status: StatusCode,

    /// Replay nonce to use for the next request of the same flow.
    pub nonce: Option<String>,

    /// `Location` header, set on resource creation.
    pub location: Option<String>,

    pub content_type: Option<String>,

    /// `Retry-After` header, when given in seconds.
    pub retry_after: Option<Duration>,

    pub body: String,
}

impl AcmeResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Signed, replay protected requests against an ACME provider.
///
/// The transport resolves named resources through the provider's directory, which it fetches once
/// and shares between clones. It keeps no nonce between calls: each call returns the nonce of its
/// response in [`AcmeResponse::nonce`] and the caller hands it to the next call of the same flow.
/// Flows running concurrently on clones of one transport therefore never compete for a nonce.
///
/// Nothing is retried here, not even bad nonces. Only the caller knows what is safe to repeat.
#[derive(Debug, Clone)]
pub struct SignedTransport {
    inner: Arc<TransportInner>,
}

#[derive(Debug)]
struct TransportInner {
    client: reqwest::Client,
    directory: DirectoryCache,
}

impl SignedTransport {
    /// Creates a transport for the given directory, with 30 second timeouts.
    pub fn new(url: DirectoryUrl<'_>) -> Result<Self> {
        Ok(Self::with_client(url, http_client()?))
    }

    /// Creates a transport using a preconfigured HTTP client.
    pub fn with_client(url: DirectoryUrl<'_>, client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                client,
                directory: DirectoryCache::new(url.to_url()),
            }),
        }
    }

    pub fn directory_url(&self) -> &str {
        self.inner.directory.url()
    }

    /// Returns the provider's directory, fetching it on first use.
    pub async fn directory(&self) -> Result<&api::Directory> {
        self.inner.directory.get(&self.inner.client).await
    }

    /// Resolves a target to a URL.
    pub async fn resolve(&self, target: Target<'_>) -> Result<String> {
        match target {
            Target::Url(url) => Ok(url.to_owned()),
            Target::Resource(resource) => {
                let directory = self.directory().await?;
                Ok(resource.url_in(directory).to_owned())
            }
        }
    }

    /// Unsigned GET, for bootstrapping only.
    pub async fn get(&self, url: &str) -> Result<AcmeResponse> {
        req_get(&self.inner.client, url).await
    }

    /// Fetches a fresh nonce from the newNonce resource.
    pub async fn new_nonce(&self) -> Result<String> {
        log::debug!("Request new nonce");

        let url = self.resolve(Target::Resource(Resource::NewNonce)).await?;
        let res = self.get(&url).await?;

        res.nonce
            .ok_or_else(|| Error::malformed("newNonce response without Replay-Nonce header"))
    }

    /// Signs `payload` and POSTs it to `target`.
    ///
    /// Uses `nonce` if given, otherwise fetches a fresh one first. The nonce is consumed either
    /// way.
    pub async fn signed_request<T>(
        &self,
        target: Target<'_>,
        payload: &T,
        signer: Signer<'_>,
        nonce: Option<String>,
    ) -> Result<AcmeResponse>
    where
        T: Serialize + ?Sized,
    {
        self.do_call(target, payload, signer, nonce, None).await
    }

    /// Like [`signed_request`](Self::signed_request), asking for a specific media type.
    ///
    /// Used to download certificates as `application/pem-certificate-chain`.
    pub async fn signed_request_accept<T>(
        &self,
        target: Target<'_>,
        payload: &T,
        signer: Signer<'_>,
        nonce: Option<String>,
        accept: &str,
    ) -> Result<AcmeResponse>
    where
        T: Serialize + ?Sized,
    {
        self.do_call(target, payload, signer, nonce, Some(accept))
            .await
    }

    async fn do_call<T>(
        &self,
        target: Target<'_>,
        payload: &T,
        signer: Signer<'_>,
        nonce: Option<String>,
        accept: Option<&str>,
    ) -> Result<AcmeResponse>
    where
        T: Serialize + ?Sized,
    {
        let url = self.resolve(target).await?;

        let nonce = match nonce {
            Some(nonce) => {
                log::trace!("Use threaded nonce");
                nonce
            }
            None => self.new_nonce().await?,
        };

        let protected = signer.protected_header(&url, nonce)?;
        let body = jws::sign(&protected, signer.key(), payload)?;

        log::debug!("Call endpoint: {url}");

        req_post(&self.inner.client, &url, body, accept).await
    }
}

//! See [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use base64::prelude::*;
use ecdsa::signature::Signer as _;
use eyre::eyre;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::acc::AccountKey;

/// JWS Protected Header scheme as defined in [RFC 8555 §6.2].
///
/// > For newAccount requests, and for revokeCert requests authenticated by a certificate key,
/// > there MUST be a "jwk" field. This field MUST contain the public key corresponding to the
/// > private key used to sign the JWS.
/// >
/// > For all other requests, the request is signed using an existing account, and there MUST be a
/// > "kid" field. This field MUST contain the account URL received by POSTing to the newAccount
/// > resource.
///
/// [RFC 8555 §6.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.2
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JwsProtectedHeader {
    /// Algorithm. Always `ES256` since account keys are P-256.
    alg: String,

    /// Anti-replay nonce as defined in [RFC 8555 §6.5].
    ///
    /// [RFC 8555 §6.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5
    nonce: String,

    /// Target URL as defined in [RFC 8555 §6.4].
    ///
    /// [RFC 8555 §6.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.4
    url: String,

    /// JSON Web Key. Mutually exclusive with `kid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,

    /// Key ID. Mutually exclusive with `jwk`.
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl JwsProtectedHeader {
    pub(crate) fn new_jwk(jwk: Jwk, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "ES256".to_owned(),
            url: url.to_owned(),
            nonce,
            jwk: Some(jwk),
            kid: None,
        }
    }

    pub(crate) fn new_kid(kid: &str, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "ES256".to_owned(),
            url: url.to_owned(),
            nonce,
            jwk: None,
            kid: Some(kid.to_owned()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct Jwk {
    alg: String,
    crv: String,
    kty: String,
    #[serde(rename = "use")]
    _use: String,
    x: String,
    y: String,
}

impl TryFrom<&AccountKey> for Jwk {
    type Error = eyre::Error;

    fn try_from(key: &AccountKey) -> eyre::Result<Self> {
        let point = key.signing_key().verifying_key().to_encoded_point(false);

        let x = point.x().ok_or_else(|| eyre!("public key has no x coordinate"))?;
        let y = point.y().ok_or_else(|| eyre!("public key has no y coordinate"))?;

        Ok(Jwk {
            alg: "ES256".to_owned(),
            kty: "EC".to_owned(),
            crv: "P-256".to_owned(),
            _use: "sig".to_owned(),
            x: BASE64_URL_SAFE_NO_PAD.encode(x),
            y: BASE64_URL_SAFE_NO_PAD.encode(y),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
// LEXICAL ORDER OF FIELDS MATTER!
pub(crate) struct JwkThumb {
    crv: String,
    kty: String,
    x: String,
    y: String,
}

impl JwkThumb {
    /// SHA-256 of the canonical JSON, base64url encoded.
    pub(crate) fn digest(&self) -> eyre::Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(json)))
    }
}

impl From<&Jwk> for JwkThumb {
    fn from(a: &Jwk) -> Self {
        JwkThumb {
            crv: a.crv.clone(),
            kty: a.kty.clone(),
            x: a.x.clone(),
            y: a.y.clone(),
        }
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2>
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FlattenedJsonJws {
    protected: String,
    payload: String,
    signature: String,
}

/// Constructs and signs a flattened JWS with protected header according to [RFC 7515 §5.1].
///
/// [RFC 7515 §5.1]: https://datatracker.ietf.org/doc/html/rfc7515#section-5.1
pub(crate) fn sign<T: Serialize + ?Sized>(
    protected: &JwsProtectedHeader,
    key: &AccountKey,
    payload: &T,
) -> eyre::Result<String> {
    let protected = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(protected)?);

    let payload = {
        let payload_json = serde_json::to_string(payload)?;

        // POST-as-GET sends an empty payload, which is not itself base64url encoded
        if payload_json == "\"\"" {
            String::new()
        } else {
            BASE64_URL_SAFE_NO_PAD.encode(payload_json)
        }
    };

    let to_sign = format!("{protected}.{payload}");
    let signature: p256::ecdsa::Signature = key
        .signing_key()
        .try_sign(to_sign.as_bytes())
        .map_err(|err| eyre!("failed to sign request: {err}"))?;
    let signature = BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes());

    let jws = FlattenedJsonJws {
        protected,
        payload,
        signature,
    };

    Ok(serde_json::to_string(&jws)?)
}

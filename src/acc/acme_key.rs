use eyre::WrapErr as _;
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use zeroize::Zeroizing;

use crate::jws::{Jwk, JwkThumb};

/// Elliptic curve P-256 key used to sign requests for an ACME account.
#[derive(Clone, Debug)]
pub struct AccountKey {
    signing_key: p256::ecdsa::SigningKey,
}

impl AccountKey {
    /// Generates a fresh random key.
    pub fn generate() -> AccountKey {
        Self::from_signing_key(crate::create_p256_key())
    }

    /// Reads a PKCS #8 PEM encoded private key.
    pub fn from_pem(pem: &str) -> eyre::Result<AccountKey> {
        let signing_key = p256::ecdsa::SigningKey::from_pkcs8_pem(pem)
            .wrap_err("Failed to read account key PEM")?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn from_signing_key(signing_key: p256::ecdsa::SigningKey) -> AccountKey {
        AccountKey { signing_key }
    }

    /// Private key as PKCS #8 PEM, for persisting the account.
    pub fn to_pem(&self) -> eyre::Result<Zeroizing<String>> {
        self.signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .wrap_err("private_key_to_pem")
    }

    pub(crate) fn signing_key(&self) -> &p256::ecdsa::SigningKey {
        &self.signing_key
    }

    /// Public half of the key as a JWK.
    pub(crate) fn jwk(&self) -> eyre::Result<Jwk> {
        Jwk::try_from(self)
    }

    /// JWK thumbprint as defined in [RFC 7638], base64url encoded.
    ///
    /// [RFC 7638]: https://datatracker.ietf.org/doc/html/rfc7638
    pub fn thumbprint(&self) -> eyre::Result<String> {
        let jwk = self.jwk()?;
        JwkThumb::from(&jwk).digest()
    }
}

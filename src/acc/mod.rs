use crate::{
    api,
    error::{Error, Result},
    trans::{Signer, SignedTransport, Target},
    Resource,
};

mod acme_key;

pub use self::acme_key::AccountKey;

/// Account with an ACME provider, as needed to sign requests.
///
/// Holds the account's signing key, the account URL the provider assigned at registration (used
/// as the `kid` of every request), and the key thumbprint used for key authorizations.
///
/// Persisting accounts is up to the application. Either keep the key PEM and account URL and use
/// [`AccountContext::new`], or call [`AccountContext::register`], which is idempotent for an
/// existing key.
#[derive(Debug, Clone)]
pub struct AccountContext {
    key: AccountKey,
    id: String,
    thumbprint: String,
}

impl AccountContext {
    /// Creates a context from a known key and account URL.
    pub fn new(key: AccountKey, id: impl Into<String>) -> Result<Self> {
        let thumbprint = key.thumbprint()?;

        Ok(Self {
            key,
            id: id.into(),
            thumbprint,
        })
    }

    /// Registers `key` with the provider, agreeing to its terms of service.
    ///
    /// For a key that is already registered the provider responds with the existing account, so
    /// this also serves to look up the account URL of a stored key.
    pub async fn register(
        transport: &SignedTransport,
        key: AccountKey,
        contact: Option<Vec<String>>,
    ) -> Result<Self> {
        let payload = api::Account::registration(contact);

        let res = transport
            .signed_request(
                Target::Resource(Resource::NewAccount),
                &payload,
                Signer::Jwk(&key),
                None,
            )
            .await?;

        let kid = res
            .location
            .clone()
            .ok_or_else(|| Error::malformed("newAccount response without Location header"))?;
        log::debug!("Key ID is: {kid}");

        let api_account = res.json::<api::Account>()?;
        if api_account.is_status_deactivated() {
            return Err(Error::malformed(format!("account {kid} is deactivated")));
        }

        Self::new(key, kid)
    }

    pub fn key(&self) -> &AccountKey {
        &self.key
    }

    /// Account URL, sent as `kid` in the JWS protected header.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub(crate) fn signer(&self) -> Signer<'_> {
        Signer::Kid {
            key: &self.key,
            kid: &self.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test, DirectoryUrl};

    #[tokio::test]
    async fn test_register_account() {
        let server = test::with_directory_server(test::Script::default());
        let transport = SignedTransport::new(DirectoryUrl::Other(&server.dir_url)).unwrap();

        let key = AccountKey::generate();
        let acc = AccountContext::register(
            &transport,
            key.clone(),
            Some(vec!["mailto:foo@bar.com".to_owned()]),
        )
        .await
        .unwrap();

        assert_eq!(acc.id(), format!("{}/acme/acct/7728515", server.url));
        assert_eq!(acc.thumbprint(), key.thumbprint().unwrap());

        // registration is the only request signed with the full key
        let signed = server.signed_requests();
        assert_eq!(signed.len(), 1);
        assert!(signed[0].jwk);
        assert!(signed[0].kid.is_none());
        assert_eq!(signed[0].payload["termsOfServiceAgreed"], true);
    }
}

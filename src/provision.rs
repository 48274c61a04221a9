//! Publishing key authorizations for `http-01` validation.
//!
//! During an order the provider fetches
//!
//! ```text
//! http://<domain>/.well-known/acme-challenge/<token>
//! ```
//!
//! and expects the key authorization as the response body. The order engine only writes and
//! removes those values through a [`ChallengeProvisioner`]; serving them is up to the application,
//! which reads them back with [`ChallengeProvisioner::get`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;

/// Storage for key authorizations shared between the order engine and the challenge responder.
///
/// `set` must only return once the value is visible to `get` (and to whatever answers the
/// provider's validation request), since the engine tells the provider to validate right after.
#[async_trait]
pub trait ChallengeProvisioner: Send + Sync {
    /// Stores the key authorization for `token` under `domain`.
    async fn set(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()>;

    /// Looks up a stored key authorization.
    async fn get(&self, domain: &str, token: &str) -> Result<Option<String>>;

    /// Removes a stored key authorization. Removing an unknown token is not an error.
    async fn remove(&self, domain: &str, token: &str) -> Result<()>;
}

/// Process local provisioner, for when the challenge responder runs in the same process.
#[derive(Debug, Default)]
pub struct MemoryProvisioner {
    values: RwLock<HashMap<(String, String), String>>,
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key authorization by token alone, for responders that do not know the domain.
    pub fn find_token(&self, token: &str) -> Option<String> {
        self.values
            .read()
            .iter()
            .find(|((_, t), _)| t == token)
            .map(|(_, key_auth)| key_auth.clone())
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[async_trait]
impl ChallengeProvisioner for MemoryProvisioner {
    async fn set(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()> {
        self.values.write().insert(
            (domain.to_owned(), token.to_owned()),
            key_authorization.to_owned(),
        );
        Ok(())
    }

    async fn get(&self, domain: &str, token: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .read()
            .get(&(domain.to_owned(), token.to_owned()))
            .cloned())
    }

    async fn remove(&self, domain: &str, token: &str) -> Result<()> {
        self.values
            .write()
            .remove(&(domain.to_owned(), token.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_is_visible_until_removed() {
        let provisioner = MemoryProvisioner::new();
        provisioner.set("example.org", "tok", "tok.thumb").await.unwrap();

        assert_eq!(
            provisioner.get("example.org", "tok").await.unwrap().as_deref(),
            Some("tok.thumb")
        );
        assert_eq!(provisioner.get("other.org", "tok").await.unwrap(), None);
        assert_eq!(provisioner.find_token("tok").as_deref(), Some("tok.thumb"));

        provisioner.remove("example.org", "tok").await.unwrap();
        assert!(provisioner.is_empty());

        // removing twice is fine
        provisioner.remove("example.org", "tok").await.unwrap();
    }
}

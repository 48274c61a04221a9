//! Issue-or-renew on top of the order engine.

use std::sync::Arc;

use async_trait::async_trait;
use pkcs8::EncodePrivateKey as _;

use crate::{
    acc::AccountContext,
    cert::{create_csr, create_p256_key, Certificate},
    error::Result,
    order::OrderEngine,
    provision::ChallengeProvisioner,
};

/// Where issued certificates are kept between runs.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Returns the stored certificate for `domain`, if any.
    async fn check(&self, domain: &str) -> Result<Option<Certificate>>;

    /// Stores a newly issued certificate for `domain`.
    async fn set(&self, domain: &str, certificate: &Certificate) -> Result<()>;
}

/// Hands out the account to order with, e.g. by loading or registering it.
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn account(&self, email: &str) -> Result<AccountContext>;
}

/// Returns a usable certificate for a domain, procuring a new one when the stored certificate is
/// missing or about to expire.
///
/// Scheduling renewals is up to the caller; calling [`get`](Self::get) regularly is enough.
pub struct CertificateManager {
    engine: OrderEngine,
    store: Arc<dyn CertificateStore>,
    accounts: Arc<dyn AccountSource>,
    provisioner: Arc<dyn ChallengeProvisioner>,
    renew_within: time::Duration,
}

impl CertificateManager {
    pub fn new(
        engine: OrderEngine,
        store: Arc<dyn CertificateStore>,
        accounts: Arc<dyn AccountSource>,
        provisioner: Arc<dyn ChallengeProvisioner>,
    ) -> Self {
        Self {
            engine,
            store,
            accounts,
            provisioner,
            renew_within: time::Duration::days(30),
        }
    }

    /// Renew certificates expiring within `threshold`. Defaults to 30 days.
    pub fn with_renewal_threshold(mut self, threshold: time::Duration) -> Self {
        self.renew_within = threshold;
        self
    }

    pub fn renewal_threshold(&self) -> time::Duration {
        self.renew_within
    }

    /// Returns the certificate for `domain`, ordering one with the account for `email` if needed.
    pub async fn get(&self, domain: &str, email: &str) -> Result<Certificate> {
        if let Some(cert) = self.store.check(domain).await? {
            match cert.expires_within(self.renew_within) {
                Ok(false) => {
                    log::debug!("Stored certificate for {domain} is still valid");
                    return Ok(cert);
                }
                Ok(true) => log::debug!("Stored certificate for {domain} is due for renewal"),
                Err(err) => log::warn!("Unreadable stored certificate for {domain}: {err}"),
            }
        }

        let account = self.accounts.account(email).await?;

        let signing_key = create_p256_key();
        let csr = create_csr(&signing_key, &[domain])?;

        let chain = self
            .engine
            .procure(&account, domain, &csr, self.provisioner.as_ref())
            .await?;

        let private_key_pem = signing_key
            .to_pkcs8_pem(pem::LineEnding::LF)
            .map_err(|err| eyre::eyre!("encode certificate key: {err}"))?;

        let cert = Certificate::new(private_key_pem, chain);
        self.store.set(domain, &cert).await?;

        log::debug!("Stored new certificate for {domain}");

        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use parking_lot::Mutex;

    use super::*;
    use crate::{
        test::{self, Script, TestServer},
        DirectoryUrl, MemoryProvisioner, PollPolicy, SignedTransport,
    };

    #[derive(Default)]
    struct MemoryStore {
        certs: Mutex<HashMap<String, Certificate>>,
    }

    #[async_trait]
    impl CertificateStore for MemoryStore {
        async fn check(&self, domain: &str) -> Result<Option<Certificate>> {
            Ok(self.certs.lock().get(domain).cloned())
        }

        async fn set(&self, domain: &str, certificate: &Certificate) -> Result<()> {
            self.certs
                .lock()
                .insert(domain.to_owned(), certificate.clone());
            Ok(())
        }
    }

    struct FixedAccount(AccountContext);

    #[async_trait]
    impl AccountSource for FixedAccount {
        async fn account(&self, _email: &str) -> Result<AccountContext> {
            Ok(self.0.clone())
        }
    }

    fn manager(server: &TestServer, store: Arc<MemoryStore>) -> CertificateManager {
        let transport = SignedTransport::new(DirectoryUrl::Other(&server.dir_url)).unwrap();
        let engine = OrderEngine::new(transport)
            .with_policy(PollPolicy::default().with_delay(Duration::from_millis(1)));

        CertificateManager::new(
            engine,
            store,
            Arc::new(FixedAccount(server.account())),
            Arc::new(MemoryProvisioner::new()),
        )
    }

    #[tokio::test]
    async fn test_fresh_certificate_is_reused() {
        let server = test::with_directory_server(Script::default());
        let store = Arc::new(MemoryStore::default());

        let existing = test::self_signed(test::DOMAIN, time::Duration::days(80));
        store.set(test::DOMAIN, &existing).await.unwrap();

        let cert = manager(&server, Arc::clone(&store))
            .get(test::DOMAIN, "foo@bar.com")
            .await
            .unwrap();

        assert_eq!(cert, existing);
        assert_eq!(server.count_requests("/acme/new-order"), 0);
    }

    #[tokio::test]
    async fn test_expiring_certificate_is_renewed() {
        let issued = test::self_signed(test::DOMAIN, time::Duration::days(90));
        let server = test::with_directory_server(Script {
            certificate: issued.certificate().to_owned(),
            ..Script::default()
        });
        let store = Arc::new(MemoryStore::default());

        let expiring = test::self_signed(test::DOMAIN, time::Duration::days(10));
        store.set(test::DOMAIN, &expiring).await.unwrap();

        let cert = manager(&server, Arc::clone(&store))
            .get(test::DOMAIN, "foo@bar.com")
            .await
            .unwrap();

        assert_eq!(cert.certificate(), issued.certificate());
        assert_ne!(cert.private_key(), expiring.private_key());
        assert!(cert.valid_days_left().unwrap() >= 89);

        assert_eq!(server.count_requests("/acme/new-order"), 1);
        assert_eq!(
            store.check(test::DOMAIN).await.unwrap().unwrap().certificate(),
            issued.certificate()
        );
    }

    #[tokio::test]
    async fn test_missing_certificate_is_issued() {
        let server = test::with_directory_server(Script::default());
        let store = Arc::new(MemoryStore::default());

        let cert = manager(&server, Arc::clone(&store))
            .with_renewal_threshold(time::Duration::days(7))
            .get(test::DOMAIN, "foo@bar.com")
            .await
            .unwrap();

        assert_eq!(cert.certificate(), "CERT HERE");
        assert!(store.check(test::DOMAIN).await.unwrap().is_some());
    }
}

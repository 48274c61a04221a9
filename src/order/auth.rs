//! Authorization and challenge steps of a procurement.

use crate::{
    api::{self, AuthorizationStatus, OrderStatus},
    error::{AcmeError, Error, Result},
    trans::Target,
};

use super::{Order, Procurement};

/// Key authorization for a challenge `token`, as served for `http-01` validation.
///
/// See [RFC 8555 §8.1].
///
/// [RFC 8555 §8.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.1
pub fn key_authorization(token: &str, thumbprint: &str) -> String {
    format!("{token}.{thumbprint}")
}

impl Procurement<'_> {
    /// Fetches the order's authorization (POST-as-GET).
    pub(super) async fn fetch_authorization(&mut self) -> Result<api::Authorization> {
        self.order
            .require("fetch authorization", OrderStatus::Pending)?;

        let url = Order::url_of(&self.order.authorization_url, "authorization")?.to_owned();

        log::debug!("Fetch authorization: {url}");

        let res = self.post(Target::Url(&url), &api::EmptyString).await?;
        let authz = res.json::<api::Authorization>()?;

        match authz.status {
            AuthorizationStatus::Pending | AuthorizationStatus::Valid => Ok(authz),
            status => {
                let problem = authz.challenge_error().cloned().unwrap_or_else(|| {
                    api::Problem::blank(format!("authorization is {status:?}").to_lowercase())
                });

                Err(AcmeError::new(problem, res.status.as_u16()).into())
            }
        }
    }

    /// Publishes the key authorization and asks the provider to validate it.
    ///
    /// Skipped when the provider already considers the identifier proven, or has started
    /// validating on its own.
    pub(super) async fn accept_challenge(&mut self, authz: &api::Authorization) -> Result<()> {
        if self.order.status()? != OrderStatus::Pending
            || authz.status == AuthorizationStatus::Valid
        {
            log::debug!("Authorization for {} already valid", self.order.domain);
            return Ok(());
        }

        let challenge = authz.http_challenge().ok_or_else(|| {
            Error::malformed(format!(
                "authorization for {} offers no http-01 challenge",
                self.order.domain
            ))
        })?;

        if !challenge.is_pending() {
            log::debug!("Challenge {} is {:?}", challenge.url, challenge.status);
            return Ok(());
        }

        let key_auth = key_authorization(&challenge.token, self.account.thumbprint());

        // removed in cleanup even if the set fails half way
        self.provisioned = Some(challenge.token.clone());
        self.provisioner
            .set(&self.order.domain, &challenge.token, &key_auth)
            .await?;

        log::debug!("Accept challenge: {}", challenge.url);

        self.post(Target::Url(&challenge.url), &api::EmptyObject)
            .await?;

        Ok(())
    }

    /// Asks the provider to drop the authorization.
    pub(super) async fn deactivate_authorization(&mut self, url: &str) -> Result<()> {
        log::debug!("Deactivate authorization: {url}");

        self.post(Target::Url(url), &api::Deactivation::new())
            .await?;

        Ok(())
    }
}

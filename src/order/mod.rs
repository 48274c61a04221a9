//! Order life cycle.
//!
//! [`OrderEngine::procure`] drives one order from creation to the downloaded certificate chain:
//!
//! 1. Create the order (`pending`).
//! 2. Fetch its authorization and pick the `http-01` challenge.
//! 3. Provision the key authorization and tell the provider to validate.
//! 4. Poll until the order is `ready`.
//! 5. Finalize with the CSR (`processing`).
//! 6. Poll until the order is `valid`.
//! 7. Download the certificate chain.
//!
//! Every step checks the order status last reported by the provider before it does anything.
//! The local copy of the order is only ever overwritten from a response, never advanced by the
//! client. Whatever the outcome, a provisioned key authorization is removed again, and on failure
//! the authorization is deactivated.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;

use crate::{
    acc::AccountContext,
    api::{self, OrderStatus},
    error::{AcmeError, Error, Result},
    provision::ChallengeProvisioner,
    trans::{AcmeResponse, SignedTransport, Target},
    Resource,
};

mod auth;

pub use self::auth::key_authorization;

const PEM_CERTIFICATE_CHAIN: &str = "application/pem-certificate-chain";

/// How often and how long to poll an order that is still being worked on by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait before each poll.
    pub delay: Duration,

    /// Maximum number of polls per wait.
    pub max_retries: u32,

    /// Upper bound for a `Retry-After` hint from the provider. Hints never shorten `delay`.
    pub max_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            max_retries: 10,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl PollPolicy {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait before the next poll, given the `Retry-After` of the last response.
    fn delay_for(&self, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay).max(self.delay),
            None => self.delay,
        }
    }
}

/// Local copy of an order, as last reported by the provider.
#[derive(Debug, Clone)]
pub(crate) struct Order {
    domain: String,
    status: Option<OrderStatus>,
    order_url: Option<String>,
    authorization_url: Option<String>,
    finalize_url: Option<String>,
    certificate_url: Option<String>,
    csr: Vec<u8>,
}

impl Order {
    fn new(domain: &str, csr: &[u8]) -> Self {
        Self {
            domain: domain.to_owned(),
            status: None,
            order_url: None,
            authorization_url: None,
            finalize_url: None,
            certificate_url: None,
            csr: csr.to_vec(),
        }
    }

    /// Takes over whatever the response carries. Absent fields keep their previous value.
    fn update(&mut self, api_order: &api::Order) {
        if let Some(status) = api_order.status {
            self.status = Some(status);
        }
        if let Some(url) = api_order.first_authorization() {
            self.authorization_url = Some(url.to_owned());
        }
        if let Some(url) = &api_order.finalize {
            self.finalize_url = Some(url.clone());
        }
        if let Some(url) = &api_order.certificate {
            self.certificate_url = Some(url.clone());
        }
    }

    fn status(&self) -> Result<OrderStatus> {
        self.status
            .ok_or_else(|| Error::malformed("order without status"))
    }

    /// Fails with a protocol state error unless the order is in `wanted`.
    fn require(&self, step: &'static str, wanted: OrderStatus) -> Result<()> {
        match self.status()? {
            status if status == wanted => Ok(()),
            status => Err(Error::ProtocolState { step, status }),
        }
    }

    /// Takes over an order response, then turns a failed order into the provider's error.
    fn take(&mut self, res: &AcmeResponse) -> Result<api::Order> {
        let api_order = res.json::<api::Order>()?;
        self.update(&api_order);

        if let Some(status) = api_order.status.filter(|status| status.is_failed()) {
            let problem = api_order
                .error
                .clone()
                .unwrap_or_else(|| api::Problem::blank(format!("order is {status}")));

            return Err(AcmeError::new(problem, res.status.as_u16()).into());
        }

        Ok(api_order)
    }

    fn url_of<'a>(url: &'a Option<String>, what: &str) -> Result<&'a str> {
        url.as_deref()
            .ok_or_else(|| Error::malformed(format!("order without {what} URL")))
    }
}

/// Procures certificates for single domains.
///
/// The engine is cheap to clone and may run any number of procurements at once. Each one threads
/// its own replay nonce from response to request.
#[derive(Debug, Clone)]
pub struct OrderEngine {
    transport: SignedTransport,
    policy: PollPolicy,
}

impl OrderEngine {
    pub fn new(transport: SignedTransport) -> Self {
        Self {
            transport,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn transport(&self) -> &SignedTransport {
        &self.transport
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Orders a certificate for `domain` and returns the issued chain in PEM format.
    ///
    /// `csr` is the DER encoded certificate signing request, see [`create_csr`]. The key
    /// authorization for the `http-01` challenge is published through `provisioner` for the
    /// duration of the call.
    ///
    /// The key authorization is removed and, on failure, the authorization deactivated before
    /// this returns. Dropping the future early (e.g. in `tokio::time::timeout` or `select!`)
    /// skips that cleanup; bound the call with [`PollPolicy`] instead.
    ///
    /// [`create_csr`]: crate::create_csr
    pub async fn procure(
        &self,
        account: &AccountContext,
        domain: &str,
        csr: &[u8],
        provisioner: &dyn ChallengeProvisioner,
    ) -> Result<String> {
        let mut procurement = Procurement {
            transport: &self.transport,
            policy: self.policy,
            account,
            provisioner,
            order: Order::new(domain, csr),
            nonce: None,
            provisioned: None,
            retry_after: None,
        };

        let res = procurement.run().await;

        if let Err(err) = &res {
            log::debug!("Procurement for {domain} failed: {err}");
        }

        procurement.cleanup(res.is_err()).await;

        res
    }
}

/// State of one call to [`OrderEngine::procure`].
struct Procurement<'a> {
    transport: &'a SignedTransport,
    policy: PollPolicy,
    account: &'a AccountContext,
    provisioner: &'a dyn ChallengeProvisioner,
    order: Order,

    /// Nonce of the last response, for the next request.
    nonce: Option<String>,

    /// Token handed to the provisioner, if any.
    provisioned: Option<String>,

    /// `Retry-After` of the last response.
    retry_after: Option<Duration>,
}

impl Procurement<'_> {
    async fn run(&mut self) -> Result<String> {
        self.create_order().await?;

        let authz = self.fetch_authorization().await?;
        self.accept_challenge(&authz).await?;

        self.poll_order("poll for ready", OrderStatus::Pending, OrderStatus::Ready)
            .await?;

        self.finalize().await?;

        if self.order.status()? == OrderStatus::Processing {
            self.poll_order("poll for certificate", OrderStatus::Processing, OrderStatus::Valid)
                .await?;
        }

        self.download().await
    }

    async fn post<T>(&mut self, target: Target<'_>, payload: &T) -> Result<AcmeResponse>
    where
        T: Serialize + ?Sized,
    {
        let nonce = self.nonce.take();
        let res = self
            .transport
            .signed_request(target, payload, self.account.signer(), nonce)
            .await?;

        self.nonce = res.nonce.clone();
        self.retry_after = res.retry_after;
        Ok(res)
    }

    async fn post_accept<T>(
        &mut self,
        target: Target<'_>,
        payload: &T,
        accept: &str,
    ) -> Result<AcmeResponse>
    where
        T: Serialize + ?Sized,
    {
        let nonce = self.nonce.take();
        let res = self
            .transport
            .signed_request_accept(target, payload, self.account.signer(), nonce, accept)
            .await?;

        self.nonce = res.nonce.clone();
        self.retry_after = res.retry_after;
        Ok(res)
    }

    async fn create_order(&mut self) -> Result<()> {
        log::debug!("Create order for {}", self.order.domain);

        let payload =
            api::Order::from_identifiers(vec![api::Identifier::dns(&self.order.domain)]);
        let res = self
            .post(Target::Resource(Resource::NewOrder), &payload)
            .await?;

        // cached before any check so cleanup can reach the authorization
        self.order.order_url = res.location.clone();
        let api_order = self.order.take(&res)?;

        let order_url = res
            .location
            .as_deref()
            .ok_or_else(|| Error::malformed("newOrder response without Location header"))?;

        log::debug!("Order URL is: {order_url}");

        // identifiers are case insensitive and providers report them lowercased
        let domain = &self.order.domain;
        if !api_order
            .domains()
            .iter()
            .any(|value| value.eq_ignore_ascii_case(domain))
        {
            return Err(Error::malformed(format!(
                "order {order_url} is not for {domain}"
            )));
        }

        self.order.require("create order", OrderStatus::Pending)
    }

    /// Re-fetches the order (POST-as-GET) and takes over the response.
    async fn refresh_order(&mut self) -> Result<()> {
        let url = Order::url_of(&self.order.order_url, "order")?.to_owned();

        let res = self.post(Target::Url(&url), &api::EmptyString).await?;
        self.order.take(&res)?;

        Ok(())
    }

    /// Waits for the order to move from `transient` to `wanted`.
    ///
    /// Each attempt sleeps, re-fetches the order and then decides. Any status other than the two
    /// ends the wait with an error. The provider's `Retry-After` stretches the sleep up to
    /// [`PollPolicy::max_delay`].
    async fn poll_order(
        &mut self,
        step: &'static str,
        transient: OrderStatus,
        wanted: OrderStatus,
    ) -> Result<()> {
        for attempt in 1..=self.policy.max_retries {
            tokio::time::sleep(self.policy.delay_for(self.retry_after)).await;

            self.refresh_order().await?;

            let status = self.order.status()?;
            log::debug!("Order poll {attempt}: {status}");

            if status == wanted {
                return Ok(());
            }

            if status != transient {
                return Err(Error::ProtocolState { step, status });
            }
        }

        Err(Error::StuckPolling {
            status: self.order.status()?,
            attempts: self.policy.max_retries,
        })
    }

    async fn finalize(&mut self) -> Result<()> {
        self.order.require("finalize", OrderStatus::Ready)?;

        let url = Order::url_of(&self.order.finalize_url, "finalize")?.to_owned();
        let payload = api::Finalize::from_der(&self.order.csr);

        log::debug!("Finalize order for {}", self.order.domain);

        let res = self.post(Target::Url(&url), &payload).await?;
        self.order.take(&res)?;

        match self.order.status()? {
            OrderStatus::Processing => Ok(()),
            OrderStatus::Valid if self.order.certificate_url.is_some() => Ok(()),
            status => Err(Error::ProtocolState {
                step: "finalize",
                status,
            }),
        }
    }

    async fn download(&mut self) -> Result<String> {
        self.order.require("download certificate", OrderStatus::Valid)?;

        let url = Order::url_of(&self.order.certificate_url, "certificate")?.to_owned();

        log::debug!("Download certificate: {url}");

        let res = self
            .post_accept(Target::Url(&url), &api::EmptyString, PEM_CERTIFICATE_CHAIN)
            .await?;

        if res.status != StatusCode::OK {
            return Err(Error::malformed(format!(
                "certificate download answered with HTTP {}",
                res.status
            )));
        }

        Ok(res.body)
    }

    /// Removes the provisioned token and, after a failure, deactivates the authorization.
    ///
    /// Errors are logged and dropped.
    async fn cleanup(&mut self, failed: bool) {
        if let Some(token) = self.provisioned.take() {
            log::debug!("Remove key authorization for {}", self.order.domain);

            if let Err(err) = self.provisioner.remove(&self.order.domain, &token).await {
                log::warn!("Failed to remove key authorization for {}: {err}", self.order.domain);
            }
        }

        if !failed {
            return;
        }

        if let Some(url) = self.order.authorization_url.clone() {
            if let Err(err) = self.deactivate_authorization(&url).await {
                log::warn!("Failed to deactivate authorization {url}: {err}");
            }
        }
    }
}

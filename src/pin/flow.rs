//! PIN Flow
//!
//! Two phases so the caller can show the authorization URL before blocking:
//! [`PinFlow::start`] resolves the client identity, creates a pin and builds
//! the URL; [`PendingAuthorization::wait_for_token`] polls until the user
//! approves.

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::auth_url::authorization_url;
use super::client::{AccessToken, Pin, PinClient};
use super::identity::{ClientIdentity, resolve_identity};
use super::poller::TokenPoller;
use crate::config::Config;
use crate::{Error, Result};

/// Entry point for one PIN authorization
#[derive(Debug, Clone)]
pub struct PinFlow {
    http_client: Client,
    config: Config,
}

impl PinFlow {
    /// Create a flow, building an HTTP client from the service settings
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.service.request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Self::with_client(http_client, config)
    }

    /// Create a flow around an existing HTTP client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid.
    pub fn with_client(http_client: Client, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// Resolve identity, create a pin and build its authorization URL.
    ///
    /// Nothing here is retried; the first failure aborts the flow. If `cancel`
    /// fires first, the request in flight is dropped.
    ///
    /// # Errors
    ///
    /// Returns network, transport or parse errors from the identity lookup or
    /// the pin request, configuration errors for invalid header values, and
    /// [`Error::Cancelled`] if `cancel` fires.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<PendingAuthorization> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            pending = self.begin() => pending,
        }
    }

    async fn begin(&self) -> Result<PendingAuthorization> {
        let missing = self.config.client.missing_fields();
        if !missing.is_empty() {
            warn!(
                fields = ?missing,
                "Client profile is incomplete; the service may reject requests"
            );
        }

        let client_id = self.client_identity().await?;

        let client = PinClient::new(
            self.http_client.clone(),
            &self.config.service.api_url,
            self.config.client.clone(),
            client_id,
        )?;
        let pin = client.request_pin().await?;

        let url = authorization_url(
            &self.config.service.auth_url,
            client.profile(),
            client.client_id(),
            pin.code(),
        );
        debug!(url = %url, "Built authorization URL");

        Ok(PendingAuthorization {
            client,
            pin,
            authorization_url: url,
            poller: TokenPoller::from_config(&self.config.poll),
        })
    }

    async fn client_identity(&self) -> Result<ClientIdentity> {
        if let Some(ref id) = self.config.identity.client_id {
            debug!(client_id = %id, "Using configured client identity");
            return ClientIdentity::new(id.clone());
        }
        resolve_identity(&self.http_client, &self.config.identity.url).await
    }
}

/// A live pin waiting for the user's approval
#[derive(Debug)]
pub struct PendingAuthorization {
    client: PinClient,
    pin: Pin,
    authorization_url: String,
    poller: TokenPoller,
}

impl PendingAuthorization {
    /// URL the user opens to approve the pin
    #[must_use]
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// The pin as issued
    #[must_use]
    pub fn pin(&self) -> &Pin {
        &self.pin
    }

    /// Identity the pin was requested with
    #[must_use]
    pub fn client_id(&self) -> &ClientIdentity {
        self.client.client_id()
    }

    /// Poll until the pin is approved, the deadline passes or `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`], [`Error::Cancelled`] or a non-transient
    /// error from a poll request.
    pub async fn wait_for_token(self, cancel: &CancellationToken) -> Result<AccessToken> {
        info!(pin_id = %self.pin.id(), "Waiting for authorization");
        self.poller.poll(&self.client, &self.pin, cancel).await
    }
}

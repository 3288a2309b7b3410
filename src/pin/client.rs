//! Pin Client
//!
//! Creates pairing pins and reads them back while the user approves.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::identity::ClientIdentity;
use super::poller::PinSource;
use super::profile::ClientProfile;
use super::wire;
use crate::{Error, Result};

/// A pairing pin issued by the authentication service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    id: String,
    code: String,
    auth_token: Option<AccessToken>,
    expires_in: Option<Duration>,
}

/// Where a pin stands from the poller's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinStatus {
    /// Not yet approved
    Pending,
    /// Approved; carries the issued token
    Granted(AccessToken),
}

impl Pin {
    /// Server-assigned id, the key for every poll request
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Short code the user confirms on the authorization page
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Token issued once the user approves the pairing
    #[must_use]
    pub fn auth_token(&self) -> Option<&AccessToken> {
        self.auth_token.as_ref()
    }

    /// Lifetime reported by the server when the pin was read
    #[must_use]
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    /// Current status of the pairing
    #[must_use]
    pub fn status(&self) -> PinStatus {
        match &self.auth_token {
            Some(token) => PinStatus::Granted(token.clone()),
            None => PinStatus::Pending,
        }
    }
}

/// Bearer credential issued once the pin is approved
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token string
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take ownership of the token value
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// `<pin id="..." code="..." authToken="..." expiresIn="..."/>`
#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@code")]
    code: Option<String>,
    #[serde(rename = "@authToken")]
    auth_token: Option<String>,
    #[serde(rename = "@expiresIn")]
    expires_in: Option<String>,
}

/// Parse a pin document
///
/// # Errors
///
/// Returns a parse error for malformed XML or a pin without `id` or `code`.
pub fn parse_pin(body: &str) -> Result<Pin> {
    let raw: PinResponse = wire::parse_xml(body, "pin")?;

    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let id = non_empty(raw.id)
        .ok_or_else(|| Error::Parse("pin response has no id attribute".to_string()))?;
    let code = non_empty(raw.code)
        .ok_or_else(|| Error::Parse("pin response has no code attribute".to_string()))?;

    Ok(Pin {
        id,
        code,
        auth_token: non_empty(raw.auth_token).map(AccessToken),
        expires_in: raw
            .expires_in
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .map(Duration::from_secs),
    })
}

/// Client for the pin endpoints, bound to one client identity
#[derive(Debug, Clone)]
pub struct PinClient {
    http_client: Client,
    api_url: Url,
    profile: ClientProfile,
    client_id: ClientIdentity,
}

impl PinClient {
    /// Create a pin client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `api_url` is not an absolute http(s) URL.
    pub fn new(
        http_client: Client,
        api_url: &str,
        profile: ClientProfile,
        client_id: ClientIdentity,
    ) -> Result<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| Error::Config(format!("Invalid API URL {api_url}: {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Invalid API URL {api_url}")));
        }

        Ok(Self {
            http_client,
            api_url,
            profile,
            client_id,
        })
    }

    /// Identity this client presents
    #[must_use]
    pub fn client_id(&self) -> &ClientIdentity {
        &self.client_id
    }

    /// Profile this client presents
    #[must_use]
    pub fn profile(&self) -> &ClientProfile {
        &self.profile
    }

    /// Request a new strong pin
    ///
    /// # Errors
    ///
    /// Returns a network, transport or parse error; nothing is retried.
    pub async fn request_pin(&self) -> Result<Pin> {
        let mut url = self.endpoint(&[])?;
        url.query_pairs_mut().append_pair("strong", "true");
        debug!(url = %url, "Requesting pin");

        let response = self
            .http_client
            .post(url)
            .headers(self.profile.header_map(&self.client_id)?)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Pin request failed: {e}")))?;

        let body = wire::read_body(response, "pin").await?;
        let pin = parse_pin(&body)?;

        info!(
            pin_id = %pin.id,
            expires_in = ?pin.expires_in,
            "Created pairing pin"
        );
        Ok(pin)
    }

    /// Read a pin back by id
    ///
    /// # Errors
    ///
    /// Returns a network, transport or parse error.
    pub async fn fetch_pin(&self, id: &str) -> Result<Pin> {
        let url = self.endpoint(&[id])?;

        let response = self
            .http_client
            .get(url)
            .headers(self.profile.header_map(&self.client_id)?)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Pin poll failed: {e}")))?;

        let body = wire::read_body(response, "pin").await?;
        parse_pin(&body)
    }

    /// `{api_url}/api/v2/pins[/{segments}]`
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("Invalid API URL {}", self.api_url)))?
            .pop_if_empty()
            .extend(["api", "v2", "pins"])
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl PinSource for PinClient {
    async fn fetch_pin(&self, id: &str) -> Result<Pin> {
        PinClient::fetch_pin(self, id).await
    }
}

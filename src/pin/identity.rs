//! Client Identity
//!
//! The local media server's machine identifier doubles as the OAuth client ID.

use std::fmt;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::wire;
use crate::{Error, Result};

/// Stable identifier presented to the authentication service as `clientID`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Wrap a non-empty identifier
    ///
    /// # Errors
    ///
    /// Returns a parse error if the identifier is empty or whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Parse("client identifier is empty".to_string()));
        }
        Ok(Self(id))
    }

    /// The identifier as sent on the wire
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `<MediaContainer machineIdentifier="..."/>`
#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "@machineIdentifier")]
    machine_identifier: Option<String>,
}

/// Fetch the machine identifier from the local identity endpoint
///
/// # Errors
///
/// Returns a network error if the endpoint is unreachable, a transport error
/// for a non-2xx or unreadable response, and a parse error if the document
/// lacks a `machineIdentifier`.
pub async fn resolve_identity(client: &Client, url: &str) -> Result<ClientIdentity> {
    debug!(url = %url, "Resolving client identity");

    let response = client.get(url).send().await.map_err(|e| {
        Error::Network(format!("Failed to reach identity endpoint {url}: {e}"))
    })?;
    let body = wire::read_body(response, "identity").await?;
    let identity = parse_identity(&body)?;

    debug!(client_id = %identity, "Resolved client identity");
    Ok(identity)
}

/// Extract the machine identifier from an identity document
///
/// # Errors
///
/// Returns a parse error for malformed XML or a missing or empty attribute.
pub fn parse_identity(body: &str) -> Result<ClientIdentity> {
    let container: MediaContainer = wire::parse_xml(body, "identity")?;
    container
        .machine_identifier
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            Error::Parse("identity document has no machineIdentifier attribute".to_string())
        })
        .and_then(ClientIdentity::new)
}

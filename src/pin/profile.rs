//! Client Profile
//!
//! The device metadata the authentication service expects on every request,
//! rendered either as `X-Plex-*` headers or as the `context[device][*]`
//! query used by the authorization page.

use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::identity::ClientIdentity;
use crate::{Error, Result};

/// Client metadata sent with every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProfile {
    /// Product name
    pub product: String,
    /// Application version (legacy `APP_DESCRIPTION`)
    pub version: String,
    /// Platform name
    pub platform: String,
    /// Platform version
    pub platform_version: String,
    /// Device kind
    pub device: String,
    /// Human-readable device name (legacy `APP_NAME`)
    pub device_name: String,
    /// Device model
    pub model: String,
    /// Screen resolution, `WIDTHxHEIGHT`
    pub screen_resolution: String,
    /// Layout hint
    pub layout: String,
    /// Interface language
    pub language: String,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            product: "Plex OAuth".to_string(),
            version: String::new(),
            platform: "Plex".to_string(),
            platform_version: "1.0".to_string(),
            device: "plex-oauth".to_string(),
            device_name: String::new(),
            model: "plex-oauth".to_string(),
            screen_resolution: "640x480".to_string(),
            layout: "desktop".to_string(),
            language: "en".to_string(),
        }
    }
}

impl ClientProfile {
    /// Headers identifying this client, in the order they are sent
    pub fn headers<'a>(&'a self, client_id: &'a ClientIdentity) -> Vec<(&'static str, &'a str)> {
        vec![
            ("X-Plex-Client-Identifier", client_id.as_str()),
            ("X-Plex-Product", self.product.as_str()),
            ("X-Plex-Version", self.version.as_str()),
            ("X-Plex-Platform", self.platform.as_str()),
            ("X-Plex-Platform-Version", self.platform_version.as_str()),
            ("X-Plex-Device", self.device.as_str()),
            ("X-Plex-Device-Name", self.device_name.as_str()),
            ("X-Plex-Model", self.model.as_str()),
            ("X-Plex-Device-Screen-Resolution", self.screen_resolution.as_str()),
            ("X-Plex-Layout", self.layout.as_str()),
            ("X-Plex-Language", self.language.as_str()),
        ]
    }

    /// Query parameters for the authorization page.
    ///
    /// Key order is fixed; the page's router reads the bracketed
    /// `context[device][...]` keys as a nested object.
    pub fn query<'a>(
        &'a self,
        client_id: &'a ClientIdentity,
        code: &'a str,
    ) -> Vec<(&'static str, &'a str)> {
        vec![
            ("clientID", client_id.as_str()),
            ("context[device][product]", self.product.as_str()),
            ("context[device][version]", self.version.as_str()),
            ("context[device][platform]", self.platform.as_str()),
            ("context[device][platformVersion]", self.platform_version.as_str()),
            ("context[device][device]", self.device.as_str()),
            ("context[device][deviceName]", self.device_name.as_str()),
            ("context[device][model]", self.model.as_str()),
            ("context[device][screenResolution]", self.screen_resolution.as_str()),
            ("code", code),
        ]
    }

    /// Build the header map for an XML request to the authentication service
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a profile value is not a valid header value.
    pub fn header_map(&self, client_id: &ClientIdentity) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        map.insert(ACCEPT, HeaderValue::from_static("application/xml"));

        for (name, value) in self.headers(client_id) {
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("Invalid value for {name}: {e}")))?;
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid header name {name}: {e}")))?;
            map.insert(name, value);
        }

        Ok(map)
    }

    /// Configured fields the service expects to be non-empty but are not
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.device_name.trim().is_empty() {
            missing.push("device_name");
        }
        if self.version.trim().is_empty() {
            missing.push("version");
        }
        missing
    }
}

//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::pin::ClientProfile;
use crate::{Error, Result};

/// Prefix for environment overrides (`PLEX_OAUTH_POLL__INTERVAL=2s`)
pub const ENV_PREFIX: &str = "PLEX_OAUTH_";

/// Upper bound for `poll.interval` and `poll.timeout`
pub const MAX_POLL_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Unprefixed variables understood for compatibility with older deployments
const LEGACY_ENV: [(&str, &str); 2] = [
    ("APP_NAME", "client.device_name"),
    ("APP_DESCRIPTION", "client.version"),
];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before reading environment overrides.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Client metadata sent with every request
    pub client: ClientProfile,
    /// Client identity resolution
    pub identity: IdentityConfig,
    /// Authentication service endpoints
    pub service: ServiceConfig,
    /// Token polling
    pub poll: PollConfig,
}

/// Client identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Local media server identity endpoint
    pub url: String,
    /// Fixed client identifier; skips the identity lookup when set
    pub client_id: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:32400/identity".to_string(),
            client_id: None,
        }
    }
}

/// Authentication service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// API base URL (pin endpoints live under `/api/v2/pins`)
    pub api_url: String,
    /// Web application page the user opens to approve the pin
    pub auth_url: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://plex.tv".to_string(),
            auth_url: "https://app.plex.tv/auth".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Token polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between poll requests
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Give up after this long (clamped to the pin's own expiry)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Optional cap on poll requests
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30 * 60),
            max_attempts: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Later sources win: YAML file, legacy `APP_NAME` / `APP_DESCRIPTION`,
    /// then `PLEX_OAUTH_`-prefixed variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Env files must land in the process environment before the env providers read it
        let env_files: Vec<String> = figment.extract_inner("env_files").unwrap_or_default();
        load_env_files(&env_files);

        // Read as plain strings; Env would parse a version like "1.0" as a float
        for (var, key) in LEGACY_ENV {
            if let Ok(value) = env::var(var) {
                figment = figment.merge(Serialized::default(key, value));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the flow relies on
    ///
    /// # Errors
    ///
    /// Returns an error for a zero or out-of-range poll interval or timeout, or
    /// unparsable URLs.
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval.is_zero() {
            return Err(Error::Config("poll.interval must be positive".to_string()));
        }
        if self.poll.timeout.is_zero() {
            return Err(Error::Config("poll.timeout must be positive".to_string()));
        }
        for (field, value) in [
            ("poll.interval", self.poll.interval),
            ("poll.timeout", self.poll.timeout),
        ] {
            if value > MAX_POLL_DURATION {
                return Err(Error::Config(format!(
                    "{field} must not exceed {}h",
                    MAX_POLL_DURATION.as_secs() / 3600
                )));
            }
        }
        if self.poll.max_attempts == Some(0) {
            return Err(Error::Config(
                "poll.max_attempts must be at least 1".to_string(),
            ));
        }

        for (field, value) in [
            ("service.api_url", &self.service.api_url),
            ("service.auth_url", &self.service.auth_url),
            ("identity.url", &self.identity.url),
        ] {
            Url::parse(value).map_err(|e| Error::Config(format!("{field} `{value}`: {e}")))?;
        }

        Ok(())
    }
}

/// Load environment files into the process environment.
/// Supports ~ expansion. Files that don't exist are silently skipped.
fn load_env_files(paths: &[String]) {
    for path_str in paths {
        let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
            (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
            _ => path_str.clone(),
        };

        let path = Path::new(&expanded);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        } else {
            tracing::debug!("Env file not found (skipped): {expanded}");
        }
    }
}

/// Parse a human-readable duration: `"30s"`, `"5m"`, `"100ms"` or bare seconds
///
/// # Errors
///
/// Returns a message describing the unparsable input.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let invalid = |reason: &dyn std::fmt::Display| format!("invalid duration `{s}`: {reason}");

    if let Some(ms) = s.strip_suffix("ms") {
        return ms
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| invalid(&e));
    }

    let (number, unit_secs) = if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else {
        (s, 1)
    };

    let count = number.parse::<u64>().map_err(|e| invalid(&e))?;
    count
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid(&"value out of range"))
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string (`"30s"`, or `"250ms"` below a second)
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a duration string (`"30s"`, `"5m"`, `"100ms"`) or integer seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Env providers hand bare numbers over as integers
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => super::parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }
}

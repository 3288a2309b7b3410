//! Command-line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::{Config, parse_duration};

/// Obtain a Plex access token through PIN-based device authorization
#[derive(Parser, Debug)]
#[command(name = "plex-oauth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PLEX_OAUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Device name shown on the authorization page
    #[arg(long, env = "APP_NAME")]
    pub name: Option<String>,

    /// Application version reported to the service
    #[arg(long, env = "APP_DESCRIPTION")]
    pub description: Option<String>,

    /// Use this client identifier instead of asking the local media server
    #[arg(long)]
    pub client_id: Option<String>,

    /// Local media server identity endpoint
    #[arg(long)]
    pub identity_url: Option<String>,

    /// Delay between poll requests (e.g. "1s", "500ms")
    #[arg(long, value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Give up waiting for approval after this long (e.g. "15m")
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "PLEX_OAUTH_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PLEX_OAUTH_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// How results are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// URL, then the token, as plain lines
    Text,
    /// One JSON object per line
    Json,
}

impl Cli {
    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref name) = self.name {
            config.client.device_name.clone_from(name);
        }
        if let Some(ref description) = self.description {
            config.client.version.clone_from(description);
        }
        if let Some(ref client_id) = self.client_id {
            config.identity.client_id = Some(client_id.clone());
        }
        if let Some(ref url) = self.identity_url {
            config.identity.url.clone_from(url);
        }
        if let Some(interval) = self.poll_interval {
            config.poll.interval = interval;
        }
        if let Some(timeout) = self.timeout {
            config.poll.timeout = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::try_parse_from([
            "plex-oauth",
            "--name",
            "Kitchen",
            "--description",
            "3.0",
            "--client-id",
            "abc123",
            "--poll-interval",
            "250ms",
            "--timeout",
            "2m",
            "--format",
            "json",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.client.device_name, "Kitchen");
        assert_eq!(config.client.version, "3.0");
        assert_eq!(config.identity.client_id.as_deref(), Some("abc123"));
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.poll.timeout, Duration::from_secs(120));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let cli = Cli::try_parse_from(["plex-oauth", "--identity-url", "http://nas:32400/identity"])
            .unwrap();
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.identity.url, "http://nas:32400/identity");
        assert_eq!(config.poll.interval, Duration::from_secs(1));
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn invalid_duration_is_rejected() {
        assert!(Cli::try_parse_from(["plex-oauth", "--timeout", "forever"]).is_err());
        assert!(Cli::try_parse_from(["plex-oauth", "--timeout", "999999999999999999m"]).is_err());
    }

    #[test]
    fn huge_timeout_fails_validation() {
        let cli = Cli::try_parse_from(["plex-oauth", "--timeout", "18446744073709551615"]).unwrap();
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.poll.timeout, Duration::from_secs(u64::MAX));
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
        assert!(matches!(crate::PinFlow::new(config), Err(crate::Error::Config(_))));
    }
}

//! Plex OAuth Library
//!
//! PIN-based device authorization against the Plex authentication service.
//!
//! # Flow
//!
//! 1. Resolve the client identity (the local media server's machine identifier)
//! 2. Request a strong pairing pin
//! 3. Show the user the authorization URL for that pin
//! 4. Poll the pin until it carries an access token, the deadline passes or
//!    the caller cancels
//!
//! ```no_run
//! use plex_oauth::{Config, PinFlow};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> plex_oauth::Result<()> {
//! let cancel = CancellationToken::new();
//! let flow = PinFlow::new(Config::load(None)?)?;
//! let pending = flow.start(&cancel).await?;
//! println!("{}", pending.authorization_url());
//! let token = pending.wait_for_token(&cancel).await?;
//! # drop(token);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod pin;

pub use config::Config;
pub use error::{Error, Result};
pub use pin::{AccessToken, PendingAuthorization, PinFlow};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging on stderr, leaving stdout for the URL and token
///
/// # Errors
///
/// Returns a configuration error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}

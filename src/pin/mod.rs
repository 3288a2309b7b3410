//! Plex PIN authorization
//!
//! Implements the device ("PIN") flow against the Plex authentication
//! service:
//!
//! - Client identity from the local media server
//! - Pairing pin creation
//! - Authorization URL for the user to open
//! - Bounded, cancellable polling for the access token

mod auth_url;
mod client;
mod flow;
mod identity;
mod poller;
mod profile;
mod wire;

pub use auth_url::authorization_url;
pub use client::{AccessToken, Pin, PinClient, PinStatus, parse_pin};
pub use flow::{PendingAuthorization, PinFlow};
pub use identity::{ClientIdentity, parse_identity, resolve_identity};
pub use poller::{PinSource, TokenPoller};
pub use profile::ClientProfile;

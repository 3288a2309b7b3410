//! Authorization URL
//!
//! The page the user opens to approve a pin. The web app routes on the
//! fragment, so the query lives after `#!?` rather than in the URL query.

use url::form_urlencoded;

use super::identity::ClientIdentity;
use super::profile::ClientProfile;

/// Build `{auth_url}/#!?{query}` for a pin code
#[must_use]
pub fn authorization_url(
    auth_url: &str,
    profile: &ClientProfile,
    client_id: &ClientIdentity,
    code: &str,
) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(profile.query(client_id, code))
        .finish();

    format!("{}/#!?{query}", auth_url.trim_end_matches('/'))
}

//! Response handling shared by the identity and pin requests

use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{Error, Result};

/// Longest body excerpt quoted in error messages
const EXCERPT_LEN: usize = 200;

/// Consume a response, returning its body as text.
///
/// The body is read to the end even on error statuses so the connection
/// can go back to the pool.
pub(crate) async fn read_body(response: Response, what: &str) -> Result<String> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Transport(format!("Failed to read {what} response: {e}")))?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes);
        return Err(Error::Transport(format!(
            "{what} request failed: HTTP {status} - {}",
            excerpt(&body)
        )));
    }

    debug!(what, status = status.as_u16(), len = bytes.len(), "Received response");

    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::Transport(format!("{what} response is not valid UTF-8: {e}")))
}

/// Deserialize an XML document
pub(crate) fn parse_xml<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    quick_xml::de::from_str(body).map_err(|e| {
        Error::Parse(format!(
            "Failed to parse {what} response: {e} (body: {})",
            excerpt(body)
        ))
    })
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(EXCERPT_LEN + 10);
        assert_eq!(excerpt(&long).chars().count(), EXCERPT_LEN);
        assert_eq!(excerpt("  short \n"), "short");
    }
}

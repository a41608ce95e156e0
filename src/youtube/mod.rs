//! Clients for the YouTube Data API v3.

mod auth;
mod search;
mod upload;

#[cfg(test)]
mod test_server;

use std::time::Duration;

use miette::{bail, Context, IntoDiagnostic, Result};
use reqwest::blocking::{Client, Response};

pub use auth::{ClientSecret, Session, StoredToken, UPLOAD_SCOPE};
pub use search::{SearchQuery, VideoSearch, YoutubeSearch};
pub use upload::{VideoPublisher, YoutubeUploader};

/// Build the HTTP client shared by the API calls.
///
/// Uploads can take minutes so only connecting is bounded in time.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .timeout(None)
        .build()
        .into_diagnostic()
        .wrap_err("Could not build the HTTP client")
}

/// Turn a non-success answer into an error carrying the body sent by the API
fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().clone();
    let body = resp
        .text()
        .unwrap_or_else(|err| format!("<unreadable body: {err}>"));
    bail!("{url} answered {status}: {body}")
}

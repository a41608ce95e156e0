use std::{
    cell::RefCell,
    fs,
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    path::{Path, PathBuf},
};

use indoc::indoc;
use miette::{bail, miette, Context, IntoDiagnostic, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use url::Url;

use super::check_status;
use crate::io::write_atomically;

/// Permission to upload videos on the authorizing account
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// A token this close to its expiry is considered expired
const EXPIRY_MARGIN: Duration = Duration::seconds(60);

const CONSENT_DONE_PAGE: &str = indoc! {"
    <!DOCTYPE html>
    <html>
      <body>
        <p>The authentication flow has completed. You may close this window.</p>
      </body>
    </html>
"};

/// OAuth application credentials, as downloaded from the Google console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    #[serde(alias = "web")]
    installed: ClientSecret,
}

impl ClientSecret {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not read client secret file {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(content)
            .into_diagnostic()
            .wrap_err("Invalid client secret file")?;
        Ok(file.installed)
    }

    /// URL the user visits to grant the upload permission
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.auth_uri,
            [
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", UPLOAD_SCOPE),
                ("state", state),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .into_diagnostic()
        .wrap_err("Invalid auth_uri in client secret")
    }
}

/// Persisted OAuth tokens.
///
/// The field layout is the one of Google's "authorized user" files so
/// token files are interchangeable with the official client libraries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expiry: Option<OffsetDateTime>,
}

/// Answer of the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

impl StoredToken {
    fn new(secret: &ClientSecret) -> Self {
        Self {
            token: None,
            refresh_token: None,
            token_uri: secret.token_uri.clone(),
            client_id: secret.client_id.clone(),
            client_secret: secret.client_secret.clone(),
            scopes: vec![UPLOAD_SCOPE.to_owned()],
            expiry: None,
        }
    }

    /// Read the token file. A missing or unreadable file yields `None`.
    pub fn read(path: &Path) -> Option<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                debug!("No usable token file at {}: {err}", path.display());
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(err) => {
                warn!("Ignoring malformed token file {}: {err}", path.display());
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).into_diagnostic()?;
        write_atomically(path, &json).wrap_err("Could not save the OAuth token")
    }

    /// Whether the access token can be used right now
    pub fn is_valid(&self, now: OffsetDateTime) -> bool {
        self.token.is_some() && self.expiry.map_or(true, |expiry| expiry - EXPIRY_MARGIN > now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Take in a fresh answer of the token endpoint
    fn apply(&mut self, resp: TokenResponse, now: OffsetDateTime) {
        self.token = Some(resp.access_token);
        if let Some(refresh_token) = resp.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        self.expiry = resp.expires_in.map(|secs| now + Duration::seconds(secs));
        if let Some(scope) = resp.scope {
            self.scopes = scope.split_whitespace().map(String::from).collect();
        }
    }

    /// Exchange the refresh token for a new access token
    fn refresh(&mut self, http: &Client) -> Result<()> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or_else(|| miette!("No refresh token stored"))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let resp = http
            .post(&self.token_uri)
            .form(&params)
            .send()
            .into_diagnostic()
            .wrap_err("Token refresh request failed")?;
        let resp: TokenResponse = check_status(resp)?
            .json()
            .into_diagnostic()
            .wrap_err("Could not decode refreshed token")?;

        self.apply(resp, OffsetDateTime::now_utc());
        Ok(())
    }
}

/// Authorized access to the API, refreshing the access token when it expires
#[derive(Debug)]
pub struct Session {
    http: Client,
    token: RefCell<StoredToken>,
    token_path: PathBuf,
}

impl Session {
    /// Reuse the stored token when still valid, refresh it when expired,
    /// and fall back to asking the user for consent otherwise.
    pub fn authenticate(
        http: Client,
        client_secret_path: &Path,
        token_path: &Path,
    ) -> Result<Self> {
        let now = OffsetDateTime::now_utc();

        let token = match StoredToken::read(token_path) {
            Some(token) if token.is_valid(now) => {
                info!("Reusing the stored token");
                token
            }
            Some(mut token) if token.can_refresh() => match token.refresh(&http) {
                Ok(()) => {
                    info!("Refreshed the stored token");
                    token.save(token_path)?;
                    token
                }
                Err(report) => {
                    warn!("Could not refresh the stored token, asking for consent again: {report}");
                    Self::consent(&http, client_secret_path, token_path)?
                }
            },
            _ => Self::consent(&http, client_secret_path, token_path)?,
        };

        Ok(Self {
            http,
            token: RefCell::new(token),
            token_path: token_path.to_path_buf(),
        })
    }

    fn consent(http: &Client, client_secret_path: &Path, token_path: &Path) -> Result<StoredToken> {
        let secret = ClientSecret::read(client_secret_path)?;
        let token = run_consent_flow(http, &secret)?;
        token.save(token_path)?;
        info!("Saved the new token to {}", token_path.display());
        Ok(token)
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// A currently valid access token
    pub fn access_token(&self) -> Result<String> {
        let mut token = self.token.borrow_mut();

        if !token.is_valid(OffsetDateTime::now_utc()) {
            debug!("Access token expired, refreshing it");
            token.refresh(&self.http)?;
            token.save(&self.token_path)?;
        }

        token
            .token
            .clone()
            .ok_or_else(|| miette!("No access token available"))
    }
}

/// Parameters the browser brings back to the loopback listener
#[derive(Debug, Default, PartialEq, Eq)]
struct Redirect {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Parse the first line of an HTTP request, e.g. `GET /?code=x&state=y HTTP/1.1`.
///
/// Returns `None` for requests that are not an authorization answer
/// (such as the browser asking for a favicon).
fn parse_redirect(request_line: &str) -> Option<Redirect> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;

    let url = Url::parse("http://localhost").ok()?.join(target).ok()?;
    let mut redirect = Redirect::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => redirect.code = Some(value.into_owned()),
            "state" => redirect.state = Some(value.into_owned()),
            "error" => redirect.error = Some(value.into_owned()),
            _ => {}
        }
    }

    (redirect.code.is_some() || redirect.error.is_some()).then_some(redirect)
}

fn random_state() -> String {
    std::iter::repeat_with(fastrand::alphanumeric).take(30).collect()
}

fn respond(mut stream: &TcpStream, status: &str, body: &str) -> Result<()> {
    write!(
        stream,
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n\
         {body}",
        body.len()
    )
    .into_diagnostic()
}

/// Installed-application flow: the user grants access in a browser which
/// is then redirected to a listener on the loopback interface.
fn run_consent_flow(http: &Client, secret: &ClientSecret) -> Result<StoredToken> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .into_diagnostic()
        .wrap_err("Could not open the local redirect listener")?;
    let port = listener.local_addr().into_diagnostic()?.port();
    let redirect_uri = format!("http://localhost:{port}/");

    let state = random_state();
    let url = secret.authorization_url(&redirect_uri, &state)?;
    info!("Please visit this URL to authorize this application: {url}");

    let code = loop {
        let (stream, _) = listener.accept().into_diagnostic()?;
        let mut request_line = String::new();
        BufReader::new(&stream)
            .read_line(&mut request_line)
            .into_diagnostic()?;

        let Some(redirect) = parse_redirect(&request_line) else {
            respond(&stream, "404 Not Found", "")?;
            continue;
        };

        if let Some(error) = redirect.error {
            respond(&stream, "200 OK", "Authorization denied.")?;
            bail!("Authorization denied: {error}");
        }
        if redirect.state.as_deref() != Some(state.as_str()) {
            respond(&stream, "400 Bad Request", "State mismatch.")?;
            bail!("Authorization answer has a mismatching state");
        }

        respond(&stream, "200 OK", CONSENT_DONE_PAGE)?;
        if let Some(code) = redirect.code {
            break code;
        }
    };

    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("client_id", secret.client_id.as_str()),
        ("client_secret", secret.client_secret.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
    ];
    let resp = http
        .post(&secret.token_uri)
        .form(&params)
        .send()
        .into_diagnostic()
        .wrap_err("Code exchange request failed")?;
    let resp: TokenResponse = check_status(resp)?
        .json()
        .into_diagnostic()
        .wrap_err("Could not decode the token answer")?;

    let mut token = StoredToken::new(secret);
    token.apply(resp, OffsetDateTime::now_utc());
    Ok(token)
}

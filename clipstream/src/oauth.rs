//! OAuth 2.0 consent and token refresh against Google's endpoints.
//!
//! Consent runs a one-shot HTTP listener on the loopback interface to catch the browser redirect.
//! When the listener cannot be started, or the redirect never arrives, the operator is asked to
//! paste the code (or the whole redirected URL) into the terminal instead.

use crate::stdin::{LineSource, SharedStdin};
use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, Scope, TokenResponse, TokenUrl, reqwest,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Where the browser is sent back to once the user has granted access.
pub const REDIRECT_ADDR: &str = "127.0.0.1:8080";

/// Upload new videos, and read the channel's existing uploads.
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.readonly",
];

/// How long to wait for the browser redirect before asking for a pasted code.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Google's "installed application" client configuration file.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

/// What the provider handed back on the redirect.
#[derive(Debug)]
enum CallbackOutcome {
    Code(AuthorizationCode),
    Denied(String),
}

/// Runs consent and refresh for one OAuth client.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    oauth_done_html: &'static str,
}

impl OAuthManager {
    /// Loads the client configuration downloaded from the Google Cloud console.
    ///
    /// # Arguments
    ///
    /// * `path` - The `client_secrets.json` file of an OAuth client, with either an
    ///   `installed` or a `web` section. Missing `auth_uri`/`token_uri` entries fall back to
    ///   Google's endpoints.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not JSON, or has neither client section.
    pub fn from_client_secrets(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read client secrets from {}", path.display()))?;
        Self::from_client_secrets_json(&raw)
            .with_context(|| format!("parse client secrets in {}", path.display()))
    }

    fn from_client_secrets_json(raw: &str) -> eyre::Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(raw).context("parse JSON")?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or_else(|| eyre::eyre!("expected an \"installed\" or \"web\" client section"))?;

        let auth_url = AuthUrl::new(
            secrets
                .auth_uri
                .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
        )
        .context("invalid auth_uri")?;
        let token_url = TokenUrl::new(
            secrets
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        )
        .context("invalid token_uri")?;

        Ok(Self {
            client_id: ClientId::new(secrets.client_id),
            client_secret: ClientSecret::new(secrets.client_secret),
            auth_url,
            token_url,
            oauth_done_html: include_str!("../oauth_success.html"),
        })
    }

    fn http_client() -> eyre::Result<reqwest::Client> {
        reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build HTTP client")
    }

    /// Performs a complete OAuth 2.0 authorization flow to obtain a new access token.
    ///
    /// This method runs the full consent flow:
    /// 1. Starting a listener on [`REDIRECT_ADDR`] for the authorization callback
    /// 2. Opening the user's browser on the consent page (the URL is also printed)
    /// 3. Waiting for the redirect, or asking for a pasted code if the listener could not start,
    ///    the redirect failed, or nothing arrived in time
    /// 4. Exchanging the authorization code for an access token
    ///
    /// # Errors
    ///
    /// Fails if the user denies access, the pasted input carries no usable code, or the code
    /// exchange is rejected.
    pub async fn authenticate(&self) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let redirect_url =
            RedirectUrl::new(format!("http://{REDIRECT_ADDR}")).context("construct redirect url")?;

        let listener = match self.setup_redirect(csrf.clone()).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "cannot listen for OAuth redirect, falling back to manual code entry");
                None
            }
        };

        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = csrf.clone();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || state.clone())
            .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        println!("Authorize ClipStream in your browser:\n\n  {auth_url}\n");
        if let Err(e) = webbrowser::open(auth_url.as_ref()) {
            tracing::warn!(error = %e, "could not open a browser; open the URL above manually");
        }

        let from_callback = match listener {
            Some(eventually_outcome) => {
                match tokio::time::timeout(CALLBACK_TIMEOUT, eventually_outcome).await {
                    Ok(Ok(CallbackOutcome::Code(code))) => Some(code),
                    Ok(Ok(CallbackOutcome::Denied(reason))) => {
                        eyre::bail!("authorization was denied: {reason}");
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(error = %format!("{e:#}"), "OAuth redirect failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("timed out waiting for the OAuth redirect");
                        None
                    }
                }
            }
            None => None,
        };
        let authorization_code = match from_callback {
            Some(code) => code,
            None => read_pasted_code(&mut SharedStdin, &csrf).await?,
        };

        let http_client = Self::http_client()?;
        let token_result = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client)
            .await
            .context("exchange authorization code with access token")?;

        Ok(token_result)
    }

    /// Attempts to refresh an existing OAuth token using its refresh token.
    ///
    /// # Arguments
    ///
    /// * `token` - The cached [`BasicTokenResponse`] whose refresh token is used
    ///
    /// # Returns
    ///
    /// * `Ok(Some(new_token))` - refresh succeeded
    /// * `Ok(None)` - no refresh token, or the provider no longer honors it
    /// * `Err(_)` - network or other error
    ///
    /// When this returns `Ok(None)` the cached token is useless and [`Self::authenticate`] has to
    /// run again.
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");

        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_token_uri(self.token_url.clone());

        let http_client = Self::http_client()?;
        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&http_client)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Starts listening for the OAuth redirect on [`REDIRECT_ADDR`].
    ///
    /// Returns a future that resolves once a redirect carrying a code (or a refusal) arrives.
    /// Unrelated requests such as `/favicon.ico` are answered with 404 and otherwise ignored.
    async fn setup_redirect(
        &self,
        csrf: CsrfToken,
    ) -> eyre::Result<impl Future<Output = eyre::Result<CallbackOutcome>>> {
        let socket = tokio::net::TcpListener::bind(REDIRECT_ADDR)
            .await
            .with_context(|| format!("bind to {REDIRECT_ADDR}"))?;
        let oauth_done = self.oauth_done_html;
        let (got, mut gotten) = tokio::sync::mpsc::channel(1);

        let server = tokio::spawn(async move {
            loop {
                let conn = match socket.accept().await {
                    Ok((conn, _)) => conn,
                    Err(e) => {
                        let _ = got.send(Err(eyre::Report::new(e).wrap_err("accept"))).await;
                        return;
                    }
                };
                let conn = hyper_util::rt::TokioIo::new(conn);
                let csrf = csrf.clone();
                let got = got.clone();
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let csrf = csrf.clone();
                    let got = got.clone();
                    async move {
                        let query = req.uri().query().unwrap_or("");
                        let (status, page) = match parse_callback_query(query, &csrf) {
                            Ok(None) => (StatusCode::NOT_FOUND, "Not found."),
                            Ok(Some(outcome)) => {
                                let page = match outcome {
                                    CallbackOutcome::Code(_) => oauth_done,
                                    CallbackOutcome::Denied(_) => {
                                        "Authorization was denied. You can close this window."
                                    }
                                };
                                let _ = got.send(Ok(outcome)).await;
                                (StatusCode::OK, page)
                            }
                            Err(msg) => {
                                let _ = got.send(Err(eyre::eyre!(msg))).await;
                                (StatusCode::BAD_REQUEST, msg)
                            }
                        };
                        let mut response = Response::new(Full::<Bytes>::from(page));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    }
                });
                tokio::spawn(async move {
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(conn, service)
                        .await
                    {
                        tracing::debug!(error = %e, "redirect connection closed with error");
                    }
                });
            }
        });

        Ok(async move {
            let _server = AbortOnDrop(server);
            let outcome = gotten.recv().await;
            outcome.ok_or_else(|| eyre::eyre!("redirect server exit prematurely"))?
        })
    }
}

/// Stops the redirect listener once nobody is waiting for it any more.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Interprets the query string of a redirect request.
///
/// `Ok(None)` means the request has nothing to do with the OAuth flow.
fn parse_callback_query(
    query: &str,
    csrf: &CsrfToken,
) -> Result<Option<CallbackOutcome>, &'static str> {
    let mut presented_state = None;
    let mut presented_code = None;
    let mut presented_error = None;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        match &*k {
            "state" => presented_state = Some(v),
            "code" => presented_code = Some(v),
            "error" => presented_error = Some(v),
            _ => {}
        }
    }

    if presented_code.is_none() && presented_error.is_none() {
        return Ok(None);
    }
    if presented_state.as_deref() != Some(csrf.secret().as_str()) {
        return Err("invalid csrf token");
    }
    if let Some(error) = presented_error {
        return Ok(Some(CallbackOutcome::Denied(error.into_owned())));
    }
    match presented_code {
        Some(code) if !code.is_empty() => Ok(Some(CallbackOutcome::Code(AuthorizationCode::new(
            code.into_owned(),
        )))),
        _ => Err("no authorization code found"),
    }
}

/// Accepts either a bare authorization code or the full URL the browser was redirected to.
///
/// # Arguments
///
/// * `input` - one line as typed or pasted by the operator
/// * `csrf` - the state parameter sent with the authorization request; a pasted URL must carry it
///
/// # Returns
///
/// The authorization code, or an error if the input is empty, belongs to another consent
/// attempt, or reports that access was denied.
fn extract_authorization_code(input: &str, csrf: &CsrfToken) -> eyre::Result<AuthorizationCode> {
    let input = input.trim();
    if input.is_empty() {
        eyre::bail!("no authorization code entered");
    }

    let query = match Url::parse(input) {
        Ok(url) => url.query().unwrap_or_default().to_string(),
        // a bare query string such as `state=...&code=...`
        Err(_) if input.contains("code=") => input.trim_start_matches('?').to_string(),
        Err(_) => return Ok(AuthorizationCode::new(input.to_string())),
    };
    match parse_callback_query(&query, csrf) {
        Ok(Some(CallbackOutcome::Code(code))) => Ok(code),
        Ok(Some(CallbackOutcome::Denied(reason))) => {
            eyre::bail!("authorization was denied: {reason}")
        }
        Ok(None) => eyre::bail!("no authorization code in the pasted URL"),
        Err(msg) => eyre::bail!("{msg}"),
    }
}

/// Asks the operator to paste the code (or redirected URL) and reads one line from `input`.
async fn read_pasted_code(
    input: &mut impl LineSource,
    csrf: &CsrfToken,
) -> eyre::Result<AuthorizationCode> {
    println!(
        "After approving access, your browser is sent to http://{REDIRECT_ADDR}/?code=...\n\
         If that page does not load, copy the full URL from the address bar (or just the code)."
    );
    print!("Paste it here: ");
    let _ = std::io::stdout().flush();

    let line = input
        .next_line()
        .await
        .context("read authorization code from stdin")?
        .ok_or_else(|| eyre::eyre!("stdin closed before an authorization code was entered"))?;
    extract_authorization_code(&line, csrf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csrf() -> CsrfToken {
        CsrfToken::new("state-123".to_string())
    }

    #[test]
    fn reads_installed_client_secrets() {
        let json = r#"{"installed": {
            "client_id": "abc.apps.googleusercontent.com",
            "project_id": "clipstream",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "s3cret",
            "redirect_uris": ["http://localhost"]
        }}"#;
        let manager = OAuthManager::from_client_secrets_json(json).unwrap();
        assert_eq!(manager.client_id.as_str(), "abc.apps.googleusercontent.com");
        assert_eq!(manager.client_secret.secret(), "s3cret");
        assert_eq!(manager.token_url.as_str(), DEFAULT_TOKEN_URL);
    }

    #[test]
    fn web_client_secrets_get_default_endpoints() {
        let json = r#"{"web": {"client_id": "id", "client_secret": "secret"}}"#;
        let manager = OAuthManager::from_client_secrets_json(json).unwrap();
        assert_eq!(manager.auth_url.as_str(), DEFAULT_AUTH_URL);
        assert_eq!(manager.token_url.as_str(), DEFAULT_TOKEN_URL);
    }

    #[test]
    fn client_secrets_without_a_client_section_are_rejected() {
        let err = OAuthManager::from_client_secrets_json(r#"{"other": {}}"#).unwrap_err();
        assert!(format!("{err:#}").contains("\"installed\""));
    }

    #[test]
    fn callback_with_code() {
        let outcome = parse_callback_query("state=state-123&code=4%2Fabc&scope=x", &csrf())
            .unwrap()
            .unwrap();
        match outcome {
            CallbackOutcome::Code(code) => assert_eq!(code.secret(), "4/abc"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn callback_rejects_wrong_state() {
        let err = parse_callback_query("state=forged&code=abc", &csrf()).unwrap_err();
        assert_eq!(err, "invalid csrf token");
    }

    #[test]
    fn callback_reports_denial() {
        let outcome = parse_callback_query("error=access_denied&state=state-123", &csrf())
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, CallbackOutcome::Denied(reason) if reason == "access_denied"));
    }

    #[test]
    fn unrelated_requests_are_ignored() {
        assert!(parse_callback_query("", &csrf()).unwrap().is_none());
    }

    #[test]
    fn pasted_bare_code() {
        let code = extract_authorization_code("  4/0AbCdEf \n", &csrf()).unwrap();
        assert_eq!(code.secret(), "4/0AbCdEf");
    }

    #[test]
    fn pasted_redirect_url() {
        let code = extract_authorization_code(
            "http://127.0.0.1:8080/?state=state-123&code=4/xyz&scope=https://www.googleapis.com/auth/youtube.upload",
            &csrf(),
        )
        .unwrap();
        assert_eq!(code.secret(), "4/xyz");
    }

    #[test]
    fn pasted_url_with_wrong_state_is_rejected() {
        let err =
            extract_authorization_code("http://127.0.0.1:8080/?state=nope&code=4/xyz", &csrf())
                .unwrap_err();
        assert!(err.to_string().contains("csrf"));
    }

    #[test]
    fn pasted_url_variants() {
        for input in [
            "HTTP://127.0.0.1:8080/?state=state-123&code=4%2Fxyz#",
            "http://localhost:8080/?code=4/xyz&state=state-123#scope",
            "?state=state-123&code=4/xyz",
        ] {
            let code = extract_authorization_code(input, &csrf()).unwrap();
            assert_eq!(code.secret(), "4/xyz", "{input}");
        }
    }

    #[tokio::test]
    async fn pasted_code_consumes_exactly_one_line() {
        use tokio::io::AsyncBufReadExt;

        let mut input = "http://127.0.0.1:8080/?state=state-123&code=4/xyz\n2\n"
            .as_bytes()
            .lines();
        let code = read_pasted_code(&mut input, &csrf()).await.unwrap();
        assert_eq!(code.secret(), "4/xyz");
        // the menu reading the same input afterwards still sees its answer
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn empty_paste_is_an_error() {
        assert!(extract_authorization_code("   ", &csrf()).is_err());
    }
}

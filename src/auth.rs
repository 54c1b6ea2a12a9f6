//! Access-token providers.
//!
//! A run obtains one bearer token up front from a [`CredentialProvider`]:
//!
//! - [`StaticToken`]: a token passed on the command line or through
//!   `DOCUP_ACCESS_TOKEN`.
//! - [`PkceLogin`]: the OAuth 2.0 authorization-code flow with PKCE (S256).
//!   A local callback listener is started on the configured redirect URI,
//!   the authorize page is opened in the browser, and the returned code is
//!   exchanged at `/services/oauth2/token`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::config::Config;

/// Environment variable holding a ready-made access token.
pub const TOKEN_ENV: &str = "DOCUP_ACCESS_TOKEN";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth.client_id must be set (or SF_CLIENT_ID) to log in")]
    MissingClientId,

    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("cannot listen for the OAuth callback on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no authorization callback received within {0:?}")]
    Timeout(Duration),

    #[error("authorization was refused: {0}")]
    Denied(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("empty access token")]
    EmptyToken,
}

/// A bearer token and, when the login reported one, the instance it is
/// valid for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub instance_url: Option<String>,
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, AuthError>;
}

/// A token supplied by the caller.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token from [`TOKEN_ENV`], if set and non-empty.
    pub fn from_env() -> Option<Self> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        let token = self.0.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(AccessToken {
            access_token: token.to_string(),
            instance_url: None,
        })
    }
}

/// PKCE code verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 48];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Browser login with authorization code + PKCE.
pub struct PkceLogin {
    instance_url: String,
    client_id: String,
    redirect_uri: String,
    timeout: Duration,
    open_browser: bool,
}

impl PkceLogin {
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        let client_id = config
            .auth
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(AuthError::MissingClientId)?;
        Ok(Self {
            instance_url: config.instance_url().to_string(),
            client_id,
            redirect_uri: config.auth.redirect_uri.clone(),
            timeout: Duration::from_secs(config.auth.login_timeout_secs),
            open_browser: true,
        })
    }

    /// Print the authorize URL instead of launching a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    pub fn authorize_url(&self, pkce: &PkcePair, state: &str) -> Result<Url, AuthError> {
        let base = format!("{}/services/oauth2/authorize", self.instance_url);
        Url::parse_with_params(
            &base,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::InvalidUrl {
            url: base,
            message: e.to_string(),
        })
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<AccessToken, AuthError> {
        let url = format!("{}/services/oauth2/token", self.instance_url);
        let response = reqwest::Client::new()
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", verifier),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;
        if !status.is_success() {
            let detail = serde_json::from_str::<OAuthError>(&body)
                .map(|e| format!("{}: {}", e.error, e.error_description))
                .unwrap_or(body);
            return Err(AuthError::Exchange(format!("HTTP {}: {}", status, detail)));
        }

        let token: AccessToken =
            serde_json::from_str(&body).map_err(|e| AuthError::Exchange(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(token)
    }

    async fn wait_for_code(&self, pkce: &PkcePair) -> Result<String, AuthError> {
        let redirect = Url::parse(&self.redirect_uri).map_err(|e| AuthError::InvalidUrl {
            url: self.redirect_uri.clone(),
            message: e.to_string(),
        })?;
        let host = match redirect.host_str() {
            Some("localhost") | None => "127.0.0.1".to_string(),
            Some(host) => host.to_string(),
        };
        let port = redirect.port_or_known_default().unwrap_or(8080);
        let addr = format!("{}:{}", host, port);

        let state = uuid::Uuid::new_v4().to_string();
        let (code_tx, code_rx) = oneshot::channel();
        let callback = CallbackState {
            expected_state: state.clone(),
            sender: Arc::new(Mutex::new(Some(code_tx))),
        };
        let app = Router::new()
            .route(redirect.path(), get(handle_callback))
            .with_state(callback);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| AuthError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!(error = %e, "callback server stopped");
            }
        });

        let url = self.authorize_url(pkce, &state)?;
        eprintln!("Opening browser for login:\n  {}", url);
        if self.open_browser {
            if let Err(e) = open_in_browser(url.as_str()) {
                tracing::warn!(error = %e, "could not open browser, open the URL manually");
            }
        }

        let outcome = tokio::time::timeout(self.timeout, code_rx).await;
        let _ = stop_tx.send(());
        let _ = server.await;

        match outcome {
            Err(_) => Err(AuthError::Timeout(self.timeout)),
            Ok(Err(_)) => Err(AuthError::Denied("callback channel closed".to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

#[async_trait]
impl CredentialProvider for PkceLogin {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        let pkce = PkcePair::generate();
        let code = self.wait_for_code(&pkce).await?;
        tracing::info!("authorization code received, exchanging");
        self.exchange_code(&code, &pkce.verifier).await
    }
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type CodeSender = oneshot::Sender<Result<String, AuthError>>;

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    sender: Arc<Mutex<Option<CodeSender>>>,
}

async fn handle_callback(
    State(callback): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let result = match (params.error, params.code) {
        (Some(error), _) => Err(AuthError::Denied(format!(
            "{} {}",
            error,
            params.error_description.unwrap_or_default()
        ))),
        (None, Some(code)) if params.state.as_deref() == Some(callback.expected_state.as_str()) => {
            Ok(code)
        }
        (None, Some(_)) => return Html("<h3>Login state mismatch; ignoring this callback.</h3>"),
        (None, None) => return Html("<h3>Error: no authorization code received.</h3>"),
    };

    let ok = result.is_ok();
    let sender = callback
        .sender
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(result);
    }

    if ok {
        Html(
            "<html><head><title>Authentication Successful</title></head><body>\
             <h3>Authentication successful! You can close this window.</h3>\
             <script>setTimeout(function() { window.close(); }, 2000);</script>\
             </body></html>",
        )
    } else {
        Html("<h3>Authentication failed. Check the terminal for details.</h3>")
    }
}

fn open_in_browser(url: &str) -> std::io::Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        let mut c = std::process::Command::new("open");
        c.arg(url);
        c
    } else if cfg!(target_os = "windows") {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(url);
        c
    };
    command.spawn().map(|_| ())
}

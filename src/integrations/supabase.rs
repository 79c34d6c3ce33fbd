//! Supabase Auth: OAuth sign-in through a loopback redirect (PKCE), token
//! refresh, sign-out and the on-disk session file.

use crate::config::{AuthConfig, RemoteConfig};
use crate::models::{AuthSession, Principal};
use chrono::{DateTime, Duration, Local, Utc};
use rand::{Rng, distributions::Alphanumeric};
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::{debug, info, warn};

const SIGN_IN_TIMEOUT_MINUTES: i64 = 10;
const VERIFIER_LEN: usize = 64;
const STATE_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Supabase is not configured; events stay in local storage")]
    NotConfigured,

    #[error("Auth request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Auth server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Sign-in failed: {0}")]
    Denied(String),

    #[error("Sign-in expired. Please retry.")]
    Expired,

    #[error("Sign-in cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What the UI shows while the browser round trip is pending.
#[derive(Clone, Debug)]
pub struct SignInDisplay {
    pub auth_url: String,
    pub listen_addr: String,
    pub expires_at: DateTime<Local>,
}

/// A started sign-in: the loopback listener plus the PKCE secrets needed to
/// finish it.
#[derive(Debug)]
pub struct SignInFlow {
    pub display: SignInDisplay,
    listener: TcpListener,
    state: String,
    verifier: String,
    cancelled: Arc<AtomicBool>,
}

impl SignInFlow {
    pub fn is_expired(&self) -> bool {
        Local::now() >= self.display.expires_at
    }

    /// Setting the returned flag stops `finish_sign_in` at its next poll.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

#[derive(Deserialize, Default)]
struct UserMetadata {
    full_name: Option<String>,
    name: Option<String>,
}

impl From<UserResponse> for Principal {
    fn from(user: UserResponse) -> Self {
        let meta = user.user_metadata.unwrap_or_default();
        Principal {
            id: user.id,
            email: user.email.unwrap_or_default(),
            display_name: meta.full_name.or(meta.name),
        }
    }
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| (Utc::now() + Duration::seconds(self.expires_in)).timestamp());
        AuthSession {
            principal: self.user.into(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

#[derive(Deserialize)]
struct AuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
}

#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
    provider: String,
    callback_port: u16,
}

impl AuthClient {
    pub fn new(remote: &RemoteConfig, auth: &AuthConfig) -> Result<Self, AuthError> {
        if !remote.is_configured() {
            return Err(AuthError::NotConfigured);
        }
        let client = Client::builder().timeout(StdDuration::from_secs(15)).build()?;
        Ok(Self {
            client,
            base_url: remote.base_url().to_string(),
            anon_key: remote.anon_key.trim().to_string(),
            provider: auth.provider.trim().to_string(),
            callback_port: auth.callback_port,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Binds the loopback listener and builds the authorize URL. The
    /// provider redirects back to this listener, the app's own origin.
    pub fn start_sign_in(&self) -> Result<SignInFlow, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", self.callback_port))?;
        let addr = listener.local_addr()?;
        let state = random_token(STATE_LEN);
        let verifier = random_token(VERIFIER_LEN);
        let redirect_to = format!("http://{addr}/callback?state={state}");

        let auth_url = Url::parse_with_params(
            &self.endpoint("authorize"),
            [
                ("provider", self.provider.as_str()),
                ("redirect_to", redirect_to.as_str()),
                ("code_challenge", verifier.as_str()),
                ("code_challenge_method", "plain"),
            ],
        )
        .map_err(|e| AuthError::Denied(format!("invalid Supabase URL: {e}")))?
        .to_string();

        info!(listen_addr = %addr, provider = %self.provider, "started sign-in flow");
        Ok(SignInFlow {
            display: SignInDisplay {
                auth_url,
                listen_addr: addr.to_string(),
                expires_at: Local::now() + Duration::minutes(SIGN_IN_TIMEOUT_MINUTES),
            },
            listener,
            state,
            verifier,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Waits for the browser redirect and trades the code for a session.
    /// Blocks until the redirect arrives or the flow expires.
    pub fn finish_sign_in(&self, flow: &SignInFlow) -> Result<AuthSession, AuthError> {
        flow.listener.set_nonblocking(true)?;
        loop {
            if flow.cancelled.load(Ordering::Relaxed) {
                return Err(AuthError::Cancelled);
            }
            if flow.is_expired() {
                return Err(AuthError::Expired);
            }
            match flow.listener.accept() {
                Ok((mut stream, _)) => {
                    // Browsers also probe for /favicon.ico and may open idle
                    // preconnect sockets; only the callback counts.
                    match read_callback(&mut stream) {
                        Ok(Some(params)) => {
                            return self.complete_callback(flow, &mut stream, params);
                        }
                        Ok(None) => {
                            let _ = respond(&mut stream, "404 Not Found", "Not found.");
                        }
                        Err(err) => {
                            warn!(error = %err, "ignoring unreadable loopback connection");
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(StdDuration::from_millis(200));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn complete_callback(
        &self,
        flow: &SignInFlow,
        stream: &mut TcpStream,
        params: CallbackParams,
    ) -> Result<AuthSession, AuthError> {
        let outcome = params
            .into_code(&flow.state)
            .and_then(|code| self.exchange_code(&code, &flow.verifier));
        match &outcome {
            Ok(_) => {
                let _ = respond(
                    stream,
                    "200 OK",
                    "Signed in. You can close this window and return to the terminal.",
                );
            }
            Err(err) => {
                let _ = respond(stream, "200 OK", &format!("Sign-in failed: {err}"));
            }
        }
        outcome
    }

    fn exchange_code(&self, code: &str, verifier: &str) -> Result<AuthSession, AuthError> {
        let resp = self
            .client
            .post(format!("{}?grant_type=pkce", self.endpoint("token")))
            .header("apikey", &self.anon_key)
            .json(&json!({ "auth_code": code, "code_verifier": verifier }))
            .send()?;
        let token: TokenResponse = check_status(resp)?.json()?;
        Ok(token.into_session())
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        let resp = self
            .client
            .post(format!("{}?grant_type=refresh_token", self.endpoint("token")))
            .header("apikey", &self.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()?;
        let token: TokenResponse = check_status(resp)?.json()?;
        debug!("refreshed access token");
        Ok(token.into_session())
    }

    pub fn fetch_user(&self, access_token: &str) -> Result<Principal, AuthError> {
        let resp = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()?;
        let user: UserResponse = check_status(resp)?.json()?;
        Ok(user.into())
    }

    pub fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let resp = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()?;
        check_status(resp)?;
        Ok(())
    }

    /// Brings a stored session up to date: refreshes the access token when it
    /// is about to expire, then confirms the user with the server.
    pub fn revalidate(&self, stored: AuthSession) -> Result<AuthSession, AuthError> {
        let mut session = if stored.expires_within(60) {
            self.refresh(&stored.refresh_token)?
        } else {
            stored
        };
        session.principal = self.fetch_user(&session.access_token)?;
        Ok(session)
    }
}

#[derive(Debug, Default, PartialEq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn parse(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }
        params
    }

    fn into_code(self, expected_state: &str) -> Result<String, AuthError> {
        if let Some(error) = self.error {
            let detail = self
                .error_description
                .map(|desc| format!("{error} ({desc})"))
                .unwrap_or(error);
            return Err(AuthError::Denied(detail));
        }
        if self.state.as_deref() != Some(expected_state) {
            return Err(AuthError::Denied("state mismatch, please retry".to_string()));
        }
        self.code
            .ok_or_else(|| AuthError::Denied("missing authorization code".to_string()))
    }
}

/// Reads the request line and returns the callback's query parameters, or
/// `None` for any other path.
fn read_callback(stream: &mut TcpStream) -> io::Result<Option<CallbackParams>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(StdDuration::from_secs(2)))?;
    let mut request_line = String::new();
    BufReader::new(&*stream).read_line(&mut request_line)?;
    Ok(parse_request_line(&request_line))
}

fn parse_request_line(line: &str) -> Option<CallbackParams> {
    let target = line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{target}")).ok()?;
    (url.path() == "/callback").then(|| CallbackParams::parse(&url))
}

fn respond(stream: &mut TcpStream, status: &str, message: &str) -> io::Result<()> {
    let body = format!("{message}\n");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes())
}

fn check_status(resp: Response) -> Result<Response, AuthError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().unwrap_or_default();
    let message = serde_json::from_str::<AuthErrorBody>(&body)
        .ok()
        .and_then(|err| err.error_description.or(err.msg).or(err.error))
        .unwrap_or_else(|| body.trim().chars().take(240).collect());
    Err(AuthError::Status { status, message })
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn load_session(path: &Path) -> Result<Option<AuthSession>, AuthError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub fn save_session(path: &Path, session: &AuthSession) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(session)?)?;
    Ok(())
}

pub fn clear_session(path: &Path) -> Result<(), AuthError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

//! Where the token cache gets its tokens from.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE, SET_COOKIE};
use serde::Serialize;

use super::errors::{ClientError, ClientResult};
use crate::http_server::TokenResponse;

/// Async token supplier. `Ok(None)` means "no session", which is not an error.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch_token(&self) -> ClientResult<Option<String>>;
}

/// Fetches tokens from `GET /api/auth/token`, presenting a session cookie
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    http: reqwest::Client,
    url: String,
    cookie: Option<String>,
}

impl HttpTokenSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{}/api/auth/token", base_url.trim_end_matches('/')),
            cookie: None,
        }
    }

    /// Present `cookie` (`name=value`) on every fetch
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> ClientResult<Option<String>> {
        let mut request = self.http.get(&self.url).header(ACCEPT, "application/json");
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::http(status.as_u16(), &body));
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.token)
    }
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
    email: &'a str,
    password: &'a str,
}

/// Create an account. Returns the session cookie pair (`name=value`).
pub async fn sign_up(base_url: &str, email: &str, password: &str) -> ClientResult<String> {
    start_session(base_url, "sign-up", email, password).await
}

/// Sign in. Returns the session cookie pair (`name=value`).
pub async fn sign_in(base_url: &str, email: &str, password: &str) -> ClientResult<String> {
    start_session(base_url, "sign-in", email, password).await
}

async fn start_session(
    base_url: &str,
    action: &str,
    email: &str,
    password: &str,
) -> ClientResult<String> {
    let url = format!("{}/api/auth/{}", base_url.trim_end_matches('/'), action);
    let response = reqwest::Client::new()
        .post(url)
        .json(&CredentialsBody { email, password })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::http(status.as_u16(), &body));
    }

    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
        .ok_or_else(|| ClientError::Decode("response carried no session cookie".to_string()))
}

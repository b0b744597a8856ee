//! # Query Client
//!
//! Sends todo statements to the database with the cached token attached as a
//! bearer credential. Without a token, nothing is sent.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::errors::{ClientError, ClientResult};
use super::token_cache::{TokenCache, TokenState};
use crate::database::{NewTodo, Todo, TodoPatch, TodoQuery};
use crate::http_server::ErrorResponse;

pub struct QueryClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenCache,
}

impl QueryClient {
    pub fn new(base_url: impl Into<String>, tokens: TokenCache) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// `select * from todos`, narrowed by `query`
    pub async fn list_todos(&self, query: &TodoQuery) -> ClientResult<Vec<Todo>> {
        let mut params = vec![("owner", query.owner.to_string())];
        if let Some(done) = query.is_complete {
            params.push(("is_complete", done.to_string()));
        }

        let url = self.url("/db/todos");
        let response = self.send(|http| http.get(url).query(&params)).await?;
        decode(response).await
    }

    pub async fn create_todo(&self, task: &str) -> ClientResult<Todo> {
        let url = self.url("/db/todos");
        let body = NewTodo::new(task);
        let response = self.send(|http| http.post(url).json(&body)).await?;
        decode(response).await
    }

    pub async fn update_todo(&self, id: i64, patch: &TodoPatch) -> ClientResult<Todo> {
        let url = self.url(&format!("/db/todos/{}", id));
        let response = self.send(|http| http.patch(url).json(patch)).await?;
        decode(response).await
    }

    pub async fn set_complete(&self, id: i64, is_complete: bool) -> ClientResult<Todo> {
        let patch = TodoPatch {
            is_complete: Some(is_complete),
            ..TodoPatch::default()
        };
        self.update_todo(id, &patch).await
    }

    pub async fn delete_todo(&self, id: i64) -> ClientResult<()> {
        let url = self.url(&format!("/db/todos/{}", id));
        self.send(|http| http.delete(url)).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Latest settled token, or `NoCredential`
    async fn bearer(&self) -> ClientResult<String> {
        match self.tokens.settled().await {
            TokenState::Ready(Some(token)) => Ok(token),
            _ => Err(ClientError::NoCredential),
        }
    }

    async fn send(
        &self,
        build: impl FnOnce(&reqwest::Client) -> RequestBuilder,
    ) -> ClientResult<Response> {
        let token = self.bearer().await?;
        let response = build(&self.http).bearer_auth(token).send().await?;
        check(response).await
    }
}

async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => (err.code, err.error),
        Err(_) => (String::new(), body),
    };

    tracing::debug!(status = status.as_u16(), code = %code, "query rejected");

    Err(match (status, code.as_str()) {
        (StatusCode::UNAUTHORIZED, "credential_missing") => ClientError::NoCredential,
        (StatusCode::UNAUTHORIZED, _) => ClientError::CredentialRejected,
        _ => ClientError::Query {
            status: status.as_u16(),
            code,
            message,
        },
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::token_source::TokenSource;
    use async_trait::async_trait;

    struct NoSession;

    #[async_trait]
    impl TokenSource for NoSession {
        async fn fetch_token(&self) -> ClientResult<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_no_token_short_circuits_without_sending() {
        // Nothing listens here; reaching the network would be a Transport error.
        let client = QueryClient::new("http://127.0.0.1:9", TokenCache::mount(NoSession));

        assert_eq!(
            client.list_todos(&TodoQuery::default()).await,
            Err(ClientError::NoCredential)
        );
        assert_eq!(
            client.create_todo("x").await,
            Err(ClientError::NoCredential)
        );
    }

    #[tokio::test]
    async fn test_torn_down_cache_sends_nothing() {
        let tokens = TokenCache::mount(NoSession);
        tokens.teardown();
        let client = QueryClient::new("http://127.0.0.1:9/", tokens);

        assert_eq!(client.delete_todo(1).await, Err(ClientError::NoCredential));
        assert_eq!(client.url("/db/todos"), "http://127.0.0.1:9/db/todos");
    }
}

//! HTTP client that attaches OAuth credentials to every request.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, IntoUrl, Method, RequestBuilder};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{PromptError, Result};
use crate::exchange::refresh_token;
use crate::token::Token;

/// A `reqwest` client bound to one token and provider configuration.
///
/// Expired tokens are refreshed on demand through the `oauth2` refresh
/// request when a refresh token is available. Refreshed tokens live in
/// memory only.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    http: Client,
    config: ProviderConfig,
    token: Arc<Mutex<Token>>,
}

impl AuthenticatedClient {
    /// Create a new authenticated client with a default reqwest client.
    pub fn new(config: ProviderConfig, token: Token) -> Self {
        Self::with_client(Client::new(), config, token)
    }

    /// Create with a custom reqwest client.
    pub fn with_client(http: Client, config: ProviderConfig, token: Token) -> Self {
        Self {
            http,
            config,
            token: Arc::new(Mutex::new(token)),
        }
    }

    /// Get the provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Get the underlying reqwest client (no credentials attached).
    pub fn inner(&self) -> &Client {
        &self.http
    }

    /// Snapshot of the current token, without refreshing.
    pub async fn token(&self) -> Token {
        self.token.lock().await.clone()
    }

    /// Get a usable token, refreshing it first if it has expired.
    pub async fn access_token(&self) -> Result<Token> {
        let mut token = self.token.lock().await;
        if token.is_valid() {
            return Ok(token.clone());
        }

        let refresh = token
            .refresh_token
            .clone()
            .ok_or(PromptError::NoRefreshToken)?;
        debug!("access token expired, refreshing");
        *token = refresh_token(&self.http, &self.config, &refresh).await?;
        Ok(token.clone())
    }

    /// Start a request with the `Authorization` header set.
    pub async fn request<U: IntoUrl>(&self, method: Method, url: U) -> Result<RequestBuilder> {
        let token = self.access_token().await?;
        let mut value = HeaderValue::from_str(&token.authorization())?;
        value.set_sensitive(true);
        Ok(self.http.request(method, url).header(AUTHORIZATION, value))
    }

    /// Start an authenticated GET.
    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<RequestBuilder> {
        self.request(Method::GET, url).await
    }

    /// Start an authenticated POST.
    pub async fn post<U: IntoUrl>(&self, url: U) -> Result<RequestBuilder> {
        self.request(Method::POST, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        ProviderConfig::new(
            "client-1",
            format!("{}/auth", server.uri()),
            format!("{}/token", server.uri()),
        )
    }

    #[tokio::test]
    async fn test_attaches_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .and(header("Authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let token = Token::new("tok1").with_expiry(Utc::now() + Duration::seconds(3600));
        let client = AuthenticatedClient::new(config(&server), token);

        let resp = client
            .get(format!("{}/api/me", server.uri()))
            .await
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_refreshes_expired_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("refresh_token=ref1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok2",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .and(header("Authorization", "Bearer tok2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let token = Token::new("tok1")
            .with_refresh_token("ref1")
            .with_expiry(Utc::now() - Duration::seconds(60));
        let client = AuthenticatedClient::new(config(&server), token);

        for _ in 0..2 {
            let resp = client
                .get(format!("{}/api/me", server.uri()))
                .await
                .unwrap()
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status().as_u16(), 200);
        }

        let current = client.token().await;
        assert_eq!(current.access_token, "tok2");
        assert_eq!(current.refresh_token.as_deref(), Some("ref1"));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let server = MockServer::start().await;
        let token = Token::new("tok1").with_expiry(Utc::now() - Duration::seconds(60));
        let client = AuthenticatedClient::new(config(&server), token);

        let err = client.access_token().await.unwrap_err();
        assert!(matches!(err, PromptError::NoRefreshToken));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("revoked"))
            .mount(&server)
            .await;

        let token = Token::new("tok1")
            .with_refresh_token("ref1")
            .with_expiry(Utc::now() - Duration::seconds(60));
        let client = AuthenticatedClient::new(config(&server), token);

        let err = client.access_token().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }
}

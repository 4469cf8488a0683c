//! Token endpoint requests (authorization-code exchange and refresh).
//!
//! The protocol is handled by the `oauth2` crate; requests go out over the
//! caller's `reqwest` client so non-2xx answers keep their status and body.

use chrono::Utc;
use oauth2::basic::BasicErrorResponse;
use oauth2::{AuthorizationCode, HttpRequest, HttpResponse, RefreshToken, RequestTokenError};
use reqwest::Client;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{PromptError, Result};
use crate::token::Token;

/// Exchange an authorization code for a token.
///
/// `config` must carry the redirect URL used for the consent request.
/// Failures are returned as-is; a code can only be redeemed once, so
/// there is nothing to retry.
pub async fn exchange_code(http: &Client, config: &ProviderConfig, code: &str) -> Result<Token> {
    let client = config.oauth_client()?;
    let transport = |request: HttpRequest| send(http, request);

    debug!(token_url = %config.token_url, "exchanging authorization code");
    let response = client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .request_async(&transport)
        .await
        .map_err(token_error)?;

    Ok(Token::from_response(&response, Utc::now()))
}

/// Refresh an access token.
///
/// If the provider does not rotate the refresh token, the one passed in is
/// kept on the returned token.
pub async fn refresh_token(
    http: &Client,
    config: &ProviderConfig,
    refresh_token: &str,
) -> Result<Token> {
    let client = config.oauth_client()?;
    let transport = |request: HttpRequest| send(http, request);
    let refresh = RefreshToken::new(refresh_token.to_string());

    debug!(token_url = %config.token_url, "refreshing access token");
    let response = client
        .exchange_refresh_token(&refresh)
        .request_async(&transport)
        .await
        .map_err(token_error)?;

    let mut token = Token::from_response(&response, Utc::now());
    if token.refresh_token.is_none() {
        token.refresh_token = Some(refresh_token.to_string());
    }
    Ok(token)
}

async fn send(http: &Client, request: HttpRequest) -> Result<HttpResponse> {
    let (parts, body) = request.into_parts();
    let response = http
        .request(parts.method, parts.uri.to_string())
        .headers(parts.headers)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PromptError::token_exchange(status.as_u16(), body));
    }

    let headers = response.headers().clone();
    let body = response.bytes().await?;
    let mut out = HttpResponse::new(body.to_vec());
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    Ok(out)
}

fn token_error(err: RequestTokenError<PromptError, BasicErrorResponse>) -> PromptError {
    match err {
        RequestTokenError::Request(e) => e,
        RequestTokenError::ServerResponse(e) => PromptError::TokenResponse(e.to_string()),
        RequestTokenError::Parse(e, _) => PromptError::TokenResponse(e.to_string()),
        RequestTokenError::Other(msg) => PromptError::TokenResponse(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        ProviderConfig::new(
            "client-1",
            format!("{}/auth", server.uri()),
            format!("{}/token", server.uri()),
        )
        .with_client_secret("s3cret")
        .with_redirect_url("http://127.0.0.1:4000/done")
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=ABC123"))
            .and(body_string_contains("client_secret=s3cret"))
            .and(body_string_contains(
                "redirect_uri=http%3A%2F%2F127.0.0.1%3A4000%2Fdone",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "ref1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let before = Utc::now();
        let token = exchange_code(&Client::new(), &config(&server), "ABC123")
            .await
            .unwrap();

        assert_eq!(token.access_token, "tok1");
        assert_eq!(token.refresh_token.as_deref(), Some("ref1"));
        let expiry = token.expiry.unwrap();
        assert!(expiry >= before + chrono::Duration::seconds(3600));
        assert!(expiry <= Utc::now() + chrono::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_exchange_error_is_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = exchange_code(&Client::new(), &config(&server), "used-code")
            .await
            .unwrap_err();
        match err {
            PromptError::TokenExchange { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, r#"{"error":"invalid_grant"}"#);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = exchange_code(&Client::new(), &config(&server), "c")
            .await
            .unwrap_err();
        assert!(matches!(err, PromptError::TokenResponse(_)));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=ref1"))
            .and(body_string_contains("client_id=client-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok2",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = refresh_token(&Client::new(), &config(&server), "ref1")
            .await
            .unwrap();
        assert_eq!(token.access_token, "tok2");
        assert_eq!(token.refresh_token.as_deref(), Some("ref1"));
    }
}

//! OAuth tokens as cached on disk.

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicTokenResponse, BasicTokenType};
use oauth2::TokenResponse as _;
use serde::{Deserialize, Serialize};

/// How long before its recorded expiry a token is already treated as expired.
pub const EXPIRY_DELTA_SECS: i64 = 10;

/// An OAuth token as held in memory and in the cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Access token presented to the API.
    pub access_token: String,
    /// Token type, usually `Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Refresh token, if the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token expires. `None` means it does not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// Create a bearer token with no refresh token and no expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: None,
            refresh_token: None,
            expiry: None,
        }
    }

    /// Set the expiry.
    #[must_use]
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Set the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the token type.
    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Canonical authorization scheme for this token.
    pub fn scheme(&self) -> &str {
        match self.token_type.as_deref() {
            None | Some("") => "Bearer",
            Some(t) if t.eq_ignore_ascii_case("bearer") => "Bearer",
            Some(t) if t.eq_ignore_ascii_case("mac") => "MAC",
            Some(t) if t.eq_ignore_ascii_case("basic") => "Basic",
            Some(t) => t,
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.scheme(), self.access_token)
    }

    /// Check if the token expires within `secs` seconds of `now`.
    pub fn expires_within_at(&self, secs: i64, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(secs) <= now,
            None => false,
        }
    }

    /// Check if the token is expired (with a small safety margin).
    pub fn is_expired(&self) -> bool {
        self.expires_within_at(EXPIRY_DELTA_SECS, Utc::now())
    }

    /// Check if the token can be used as-is.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

impl Token {
    /// Map a token endpoint response, anchoring `expires_in` at `now`.
    pub fn from_response(response: &BasicTokenResponse, now: DateTime<Utc>) -> Self {
        let expiry = response
            .expires_in()
            .filter(|lifetime| !lifetime.is_zero())
            .and_then(|lifetime| Duration::from_std(lifetime).ok())
            .map(|lifetime| now + lifetime);

        Self {
            access_token: response.access_token().secret().clone(),
            token_type: Some(type_name(response.token_type())),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expiry,
        }
    }
}

fn type_name(token_type: &BasicTokenType) -> String {
    match token_type {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    }
}

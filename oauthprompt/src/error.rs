//! Error types for the interactive login flow.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while obtaining or using a token.
///
/// None of these are retried. Each one is either a broken environment,
/// a rejected or forged callback, or something the operator has to look at.
#[derive(Debug, Error)]
pub enum PromptError {
    /// No loopback listener could be bound. Carries the IPv4 error.
    #[error("starting HTTP server: {0}")]
    Bind(#[source] std::io::Error),

    /// The system entropy source failed.
    #[error("reading random source: {0}")]
    Entropy(#[from] getrandom::Error),

    /// Neither a browser, the terminal, nor stderr could show the URL.
    #[error("failed to notify user about URL")]
    NotifyUser(#[source] std::io::Error),

    /// The cached token file exists but does not parse.
    #[error("unmarshal {}: {source}", .path.display())]
    CacheCorrupt {
        /// Resolved cache path.
        path: PathBuf,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The token could not be written to the cache file.
    #[error("writing {}: {source}", .path.display())]
    CacheWrite {
        /// Resolved cache path.
        path: PathBuf,
        /// Write failure.
        #[source]
        source: std::io::Error,
    },

    /// The callback's `state` did not match the nonce we generated.
    #[error("incorrect response")]
    StateMismatch,

    /// The provider redirected back with an `error` instead of a code.
    #[error("provider returned error: {error}{}", suffix(.description))]
    ProviderDenied {
        /// The `error` callback parameter.
        error: String,
        /// The `error_description` callback parameter, if any.
        description: Option<String>,
    },

    /// The token endpoint rejected the request.
    #[error("token exchange failed: HTTP {status}: {body}")]
    TokenExchange {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The token endpoint answered but the body is not a usable token.
    #[error("invalid token response: {0}")]
    TokenResponse(String),

    /// Transport failure talking to the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The capture server failed or stopped before a callback arrived.
    #[error("callback server: {0}")]
    Server(String),

    /// A token could not be serialized.
    #[error("encoding token: {0}")]
    Encode(#[source] serde_json::Error),

    /// Required configuration is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Configuration is present but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A credential could not be turned into an HTTP header.
    #[error("invalid authorization header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// The token expired and there is no refresh token to renew it.
    #[error("token expired and no refresh token is available")]
    NoRefreshToken,
}

impl PromptError {
    /// Create a token exchange error.
    pub fn token_exchange(status: u16, body: impl Into<String>) -> Self {
        Self::TokenExchange {
            status,
            body: body.into(),
        }
    }

    /// Check if this error means the cache file is corrupted.
    pub fn is_cache_corruption(&self) -> bool {
        matches!(self, Self::CacheCorrupt { .. })
    }

    /// Check if this error is a rejected or forged callback.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::StateMismatch)
    }

    /// Get the HTTP status if the provider rejected a token request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TokenExchange { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn suffix(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

/// Result type for login operations.
pub type Result<T> = std::result::Result<T, PromptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = PromptError::CacheCorrupt {
            path: PathBuf::from("/tmp/tok"),
            source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        };
        assert!(err.is_cache_corruption());
        assert!(!err.is_protocol_violation());

        assert!(PromptError::StateMismatch.is_protocol_violation());
        assert!(!PromptError::StateMismatch.is_cache_corruption());
    }

    #[test]
    fn test_exchange_error_is_verbatim() {
        let err = PromptError::token_exchange(400, r#"{"error":"invalid_grant"}"#);
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.to_string(),
            r#"token exchange failed: HTTP 400: {"error":"invalid_grant"}"#
        );
    }

    #[test]
    fn test_provider_denied_display() {
        let err = PromptError::ProviderDenied {
            error: "access_denied".into(),
            description: Some("user said no".into()),
        };
        assert_eq!(err.to_string(), "provider returned error: access_denied (user said no)");

        let err = PromptError::ProviderDenied {
            error: "access_denied".into(),
            description: None,
        };
        assert_eq!(err.to_string(), "provider returned error: access_denied");
    }
}

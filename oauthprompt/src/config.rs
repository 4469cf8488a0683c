//! OAuth provider configuration.

use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenUrl,
};

use crate::error::{PromptError, Result};

/// Google's authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Google's token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";

/// `oauth2` client with the authorization and token endpoints configured.
pub type OAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Configuration for an OAuth provider.
///
/// A config is treated as immutable once a login starts. The flow derives
/// its own copy with [`ProviderConfig::with_redirect_url`] instead of
/// patching the caller's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Redirect URL sent to the provider (set per login)
    pub redirect_url: Option<String>,
    /// Extra query parameters for the consent URL
    pub auth_params: Vec<(String, String)>,
}

impl ProviderConfig {
    /// Create a new provider configuration.
    pub fn new(
        client_id: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            scopes: Vec::new(),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            redirect_url: None,
            auth_params: Vec::new(),
        }
    }

    /// Google preset: only the client credentials and scopes are needed.
    pub fn google<I, S>(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(client_id, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL)
            .with_client_secret(client_secret)
            .with_scopes(scopes)
    }

    /// Google preset with credentials from `GOOGLE_CLIENT_ID` and
    /// `GOOGLE_CLIENT_SECRET`.
    pub fn google_from_env<I, S>(scopes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| PromptError::MissingConfig("GOOGLE_CLIENT_ID".to_string()))?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| PromptError::MissingConfig("GOOGLE_CLIENT_SECRET".to_string()))?;
        Ok(Self::google(client_id, client_secret, scopes))
    }

    /// Set the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Replace the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Add a single scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Add an extra consent URL parameter (e.g. `access_type=offline`).
    #[must_use]
    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_params.push((key.into(), value.into()));
        self
    }

    /// Derive a copy with the redirect URL set. `self` is left untouched.
    #[must_use]
    pub fn with_redirect_url(&self, url: impl Into<String>) -> Self {
        Self {
            redirect_url: Some(url.into()),
            ..self.clone()
        }
    }

    /// Build the `oauth2` client for this provider.
    ///
    /// Client credentials are sent in the request body.
    pub fn oauth_client(&self) -> Result<OAuthClient> {
        let auth_url = AuthUrl::new(self.auth_url.clone())
            .map_err(|e| invalid("auth URL", &self.auth_url, e))?;
        let token_url = TokenUrl::new(self.token_url.clone())
            .map_err(|e| invalid("token URL", &self.token_url, e))?;

        let mut client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_auth_type(AuthType::RequestBody);
        if let Some(secret) = &self.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }
        if let Some(redirect) = &self.redirect_url {
            let redirect_url = RedirectUrl::new(redirect.clone())
                .map_err(|e| invalid("redirect URL", redirect, e))?;
            client = client.set_redirect_uri(redirect_url);
        }
        Ok(client)
    }

    /// Build the consent URL the user is sent to.
    pub fn auth_code_url(&self, state: &str) -> Result<String> {
        let client = self.oauth_client()?;
        let mut request = client
            .authorize_url(|| CsrfToken::new(state.to_string()))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new));
        for (key, value) in &self.auth_params {
            request = request.add_extra_param(key.as_str(), value.as_str());
        }

        let (url, _) = request.url();
        Ok(url.into())
    }
}

fn invalid(what: &str, value: &str, err: impl std::fmt::Display) -> PromptError {
    PromptError::InvalidConfig(format!("{what} {value}: {err}"))
}

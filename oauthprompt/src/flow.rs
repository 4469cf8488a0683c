//! Interactive login: cache lookup, browser consent, code exchange.

use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::info;

use crate::browser::BrowserOpener;
use crate::cache::TokenCache;
use crate::client::AuthenticatedClient;
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::exchange::exchange_code;
use crate::listener::{base_url, bind_loopback};
use crate::server::{CaptureServer, DONE_PATH};
use crate::state::random_state;
use crate::token::Token;

/// Runs the login flow with a configurable browser opener, HTTP client and
/// home directory.
#[derive(Debug, Clone, Default)]
pub struct TokenPrompt {
    opener: BrowserOpener,
    http: Client,
    home: Option<PathBuf>,
}

impl TokenPrompt {
    /// Create a prompt with the default launchers and `HOME`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different browser opener.
    #[must_use]
    pub fn with_opener(mut self, opener: BrowserOpener) -> Self {
        self.opener = opener;
        self
    }

    /// Use a custom reqwest client for token requests.
    #[must_use]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Resolve relative cache paths against `home` instead of `HOME`.
    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Token cache for `file` under this prompt's home directory.
    pub fn cache(&self, file: impl AsRef<Path>) -> TokenCache {
        match &self.home {
            Some(home) => TokenCache::with_home(file, Some(home.as_path())),
            None => TokenCache::new(file),
        }
    }

    /// Obtain a client, using the token cached in `file` if there is one.
    ///
    /// On a cache miss the user is sent through the browser consent flow
    /// and the new token is written to `file` before returning.
    pub async fn token(
        &self,
        file: impl AsRef<Path>,
        config: &ProviderConfig,
    ) -> Result<AuthenticatedClient> {
        let cache = self.cache(file);
        if let Some(token) = cache.load().await? {
            info!(path = %cache.path().display(), "using cached token");
            return Ok(AuthenticatedClient::with_client(
                self.http.clone(),
                config.clone(),
                token,
            ));
        }

        let (config, token) = self.authorize(config).await?;
        cache.save(&token).await?;
        info!(path = %cache.path().display(), "saved new token");

        Ok(AuthenticatedClient::with_client(self.http.clone(), config, token))
    }

    /// Run the browser consent flow and exchange the code, without touching
    /// any cache.
    ///
    /// Returns the configuration actually used (with the loopback redirect
    /// URL set) along with the token. The caller's `config` is not modified.
    pub async fn authorize(&self, config: &ProviderConfig) -> Result<(ProviderConfig, Token)> {
        let listener = bind_loopback().await?;
        let state = random_state()?;

        let config = config.with_redirect_url(format!("{}{}", base_url(&listener)?, DONE_PATH));
        let consent_url = config.auth_code_url(&state)?;

        let server = CaptureServer::start(listener, consent_url, state)?;
        info!(port = server.addr().port(), "waiting for authorization callback");

        self.opener.open(&server.auth_url()).await?;
        let code = server.wait().await?;

        let token = exchange_code(&self.http, &config, &code).await?;
        info!("authorization complete");
        Ok((config, token))
    }
}

/// Obtain a client for `config`, caching the token in `file`.
///
/// Relative paths are resolved against `HOME`.
pub async fn token(file: impl AsRef<Path>, config: &ProviderConfig) -> Result<AuthenticatedClient> {
    TokenPrompt::new().token(file, config).await
}

/// Like [`token`], with Google's endpoints filled in.
pub async fn google_token<I, S>(
    file: impl AsRef<Path>,
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
    scopes: I,
) -> Result<AuthenticatedClient>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = ProviderConfig::google(client_id, client_secret, scopes);
    token(file, &config).await
}

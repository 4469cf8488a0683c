//! # oauthprompt
//!
//! Interactive OAuth2 login for local command-line tools.
//!
//! On first use the user is sent through the provider's consent page in
//! their browser; the authorization code comes back to a short-lived HTTP
//! server on a loopback port, is exchanged for a token, and the token is
//! cached on disk. Later runs read the cache and skip the browser entirely.
//!
//! ## Core Concepts
//!
//! - **[`ProviderConfig`]**: Client credentials, scopes and endpoints
//! - **[`TokenPrompt`]**: Runs the login flow with injectable launchers
//! - **[`TokenCache`]**: JSON token file, resolved against `HOME`
//! - **[`AuthenticatedClient`]**: reqwest client that attaches the token
//! - **[`BrowserOpener`]**: Ordered launcher chain with terminal fallback
//!
//! ## Flow
//!
//! 1. Look up the cache file; a hit returns a client immediately
//! 2. Bind `127.0.0.1:0` (or `[::1]:0`) and generate a random `state`
//! 3. Open `http://<loopback>/auth`, which redirects to the consent page
//! 4. Wait for the provider to call `http://<loopback>/done`
//! 5. Exchange the code, write the cache, return a client
//!
//! ## Example
//!
//! ```rust,ignore
//! use oauthprompt::google_token;
//!
//! let client = google_token(
//!     ".config/myapp/token.json",
//!     "my-client-id.apps.googleusercontent.com",
//!     "my-client-secret",
//!     ["https://www.googleapis.com/auth/drive.readonly"],
//! )
//! .await?;
//!
//! let resp = client
//!     .get("https://www.googleapis.com/drive/v3/files")
//!     .await?
//!     .send()
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod browser;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod listener;
pub mod server;
pub mod state;
pub mod token;

// Re-exports
pub use browser::{BrowserOpener, CommandLauncher, Launcher};
pub use cache::TokenCache;
pub use client::AuthenticatedClient;
pub use config::ProviderConfig;
pub use error::{PromptError, Result};
pub use flow::{google_token, token, TokenPrompt};
pub use token::Token;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        google_token, token, AuthenticatedClient, PromptError, ProviderConfig, Result, Token,
        TokenCache, TokenPrompt,
    };
}

//! Log in to Google and list a few Drive files.
//!
//! The token is cached in `~/.config/oauthprompt/google.json`; delete it to
//! go through the browser again.
//!
//! Run with:
//! ```bash
//! GOOGLE_CLIENT_ID=... GOOGLE_CLIENT_SECRET=... cargo run --example google_login
//! ```

use oauthprompt::prelude::*;
use tracing_subscriber::EnvFilter;

const CACHE_FILE: &str = ".config/oauthprompt/google.json";
const SCOPE: &str = "https://www.googleapis.com/auth/drive.metadata.readonly";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ProviderConfig::google_from_env([SCOPE])?
        .with_auth_param("access_type", "offline");

    let prompt = TokenPrompt::new();
    if let Some(parent) = prompt.cache(CACHE_FILE).path().parent() {
        std::fs::create_dir_all(parent)?;
    }

    let client = prompt.token(CACHE_FILE, &config).await?;

    let files: serde_json::Value = client
        .get("https://www.googleapis.com/drive/v3/files?pageSize=5")
        .await?
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    println!("{}", serde_json::to_string_pretty(&files)?);
    Ok(())
}

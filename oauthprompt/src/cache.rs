//! On-disk token cache.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{PromptError, Result};
use crate::token::Token;

/// Mode for newly written cache files: owner and group read/write.
#[cfg(unix)]
const CACHE_MODE: u32 = 0o660;

/// Resolve `file` against `home` unless it is already absolute.
pub fn resolve_path(file: impl AsRef<Path>, home: Option<&Path>) -> PathBuf {
    let file = file.as_ref();
    if file.is_absolute() {
        return file.to_path_buf();
    }
    match home {
        Some(home) => home.join(file),
        None => file.to_path_buf(),
    }
}

/// Current value of `HOME`.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// A token cache backed by a single JSON file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Cache at `file`, resolved against `HOME` when relative.
    pub fn new(file: impl AsRef<Path>) -> Self {
        let home = home_dir();
        if home.is_none() && !file.as_ref().is_absolute() {
            warn!("HOME is not set, cache path is relative to the working directory");
        }
        Self::with_home(file, home.as_deref())
    }

    /// Cache at `file`, resolved against an explicit home directory.
    pub fn with_home(file: impl AsRef<Path>, home: Option<&Path>) -> Self {
        Self {
            path: resolve_path(file, home),
        }
    }

    /// Resolved path of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token.
    ///
    /// A missing or unreadable file is a miss (`Ok(None)`). A file that
    /// reads but does not parse is an error, so a corrupted cache is never
    /// silently replaced by a fresh login.
    pub async fn load(&self) -> Result<Option<Token>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "token cache miss");
                return Ok(None);
            }
        };

        let token = serde_json::from_slice(&data).map_err(|source| PromptError::CacheCorrupt {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "token cache hit");
        Ok(Some(token))
    }

    /// Write `token`, replacing any existing file.
    ///
    /// The token is written to a temporary file next to the cache and renamed
    /// over it, so a failed write never leaves a truncated cache behind.
    pub async fn save(&self, token: &Token) -> Result<()> {
        let data = serde_json::to_vec(token).map_err(PromptError::Encode)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_replace(&path, &data))
            .await
            .map_err(std::io::Error::other)
            .and_then(|written| written)
            .map_err(|source| PromptError::CacheWrite {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), "token cached");
        Ok(())
    }
}

fn write_replace(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(CACHE_MODE))?;
    }

    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

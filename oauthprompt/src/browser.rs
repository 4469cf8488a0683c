//! Getting the consent URL in front of the user.
//!
//! Launchers are tried in order and the first one that succeeds wins. The
//! URL is always echoed to stderr as well. When every launcher fails the
//! URL is written to the controlling terminal, or to stderr if there is none.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PromptError, Result};

/// Programs tried by default, in order.
pub const DEFAULT_LAUNCHERS: &[&str] = &[
    "xdg-open",
    "google-chrome",
    "open", // macOS
];

/// Controlling terminal device.
pub const TERMINAL_PATH: &str = "/dev/tty";

/// Something that can open a URL for the user.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Try to open `url`. Any error means "try the next one".
    async fn launch(&self, url: &str) -> io::Result<()>;
}

/// Runs an external program with the URL as its only argument.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
}

impl CommandLauncher {
    /// Launcher for `program`, looked up on `PATH`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Launcher for CommandLauncher {
    fn name(&self) -> &str {
        &self.program
    }

    async fn launch(&self, url: &str) -> io::Result<()> {
        let status = Command::new(&self.program)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} exited with {}", self.program, status),
            ))
        }
    }
}

/// Ordered launcher chain with a terminal fallback.
#[derive(Clone)]
pub struct BrowserOpener {
    launchers: Vec<Arc<dyn Launcher>>,
    terminal: Option<PathBuf>,
}

impl Default for BrowserOpener {
    fn default() -> Self {
        Self {
            launchers: DEFAULT_LAUNCHERS
                .iter()
                .map(|p| Arc::new(CommandLauncher::new(*p)) as Arc<dyn Launcher>)
                .collect(),
            terminal: Some(PathBuf::from(TERMINAL_PATH)),
        }
    }
}

impl std::fmt::Debug for BrowserOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserOpener")
            .field(
                "launchers",
                &self.launchers.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl BrowserOpener {
    /// Create an opener with the given launchers and the default terminal.
    pub fn new(launchers: Vec<Arc<dyn Launcher>>) -> Self {
        Self {
            launchers,
            terminal: Some(PathBuf::from(TERMINAL_PATH)),
        }
    }

    /// Append a launcher to the chain.
    #[must_use]
    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launchers.push(Arc::new(launcher));
        self
    }

    /// Use a different terminal device for the fallback notice.
    #[must_use]
    pub fn with_terminal(mut self, path: impl Into<PathBuf>) -> Self {
        self.terminal = Some(path.into());
        self
    }

    /// Skip the terminal device and go straight to stderr.
    #[must_use]
    pub fn without_terminal(mut self) -> Self {
        self.terminal = None;
        self
    }

    /// Show `url` to the user.
    pub async fn open(&self, url: &str) -> Result<()> {
        let _ = writeln!(io::stderr(), "oauthprompt: {url}");

        for launcher in &self.launchers {
            match launcher.launch(url).await {
                Ok(()) => {
                    info!(launcher = launcher.name(), "opened browser");
                    return Ok(());
                }
                Err(e) => debug!(launcher = launcher.name(), error = %e, "launcher failed"),
            }
        }

        self.notify_terminal(url)
    }

    fn notify_terminal(&self, url: &str) -> Result<()> {
        let tty = self
            .terminal
            .as_ref()
            .and_then(|path| OpenOptions::new().write(true).open(path).ok());

        match tty {
            Some(mut tty) => notify(&mut tty, url),
            // Hope for the best with stderr.
            None => notify(&mut io::stderr(), url),
        }
    }
}

/// Write the login instruction to `out`.
pub fn notify<W: Write>(out: &mut W, url: &str) -> Result<()> {
    writeln!(out, "To log in, please visit {url}")
        .and_then(|_| out.flush())
        .map_err(PromptError::NotifyUser)
}

//! Local HTTP server that captures the provider's redirect.
//!
//! Two routes are served on the loopback listener:
//!
//! - `/auth` redirects (301) to the provider's consent URL
//! - `/done` receives the provider's callback and reports the outcome
//!
//! Anything else is a 404. The first completion reported by `/done` ends
//! the login; the listener is closed right after it is consumed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::{PromptError, Result};

/// Path that redirects to the consent page.
pub const AUTH_PATH: &str = "/auth";
/// Path the provider redirects back to.
pub const DONE_PATH: &str = "/done";

/// Completion messages buffered before `/done` handlers start dropping them.
const COMPLETION_BUFFER: usize = 100;

/// How long in-flight responses may take to drain after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = r#"<html>
<head>
<title>Authenticated</title>
<script>
function done() {
	setTimeout(function() {window.close()}, 5000)
}
</script>
</head>
<body onload="done()">
Thanks for authenticating.
</body>
</html>
"#;

/// Outcome of one `/done` callback: the authorization code, or why there is none.
pub type Completion = Result<String>;

/// Parameters the provider sends to `/done`.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    /// Merge the form body and the query string. Body pairs come first and
    /// the first value seen for a key wins.
    fn parse(body: Option<&[u8]>, query: Option<&str>) -> Self {
        let body_pairs = body.into_iter().flat_map(|b| form_urlencoded::parse(b));
        let query_pairs = query
            .into_iter()
            .flat_map(|q| form_urlencoded::parse(q.as_bytes()));

        let mut params = Self::default();
        for (key, value) in body_pairs.chain(query_pairs) {
            let slot = match &*key {
                "state" => &mut params.state,
                "code" => &mut params.code,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// State shared with the route handlers.
struct CaptureState {
    consent_url: String,
    expected_state: String,
    completions: mpsc::Sender<Completion>,
    closed: Arc<AtomicBool>,
}

impl CaptureState {
    fn signal(&self, completion: Completion) {
        if let Err(e) = self.completions.try_send(completion) {
            warn!(error = %e, "dropping callback completion");
        }
    }
}

/// Redirect capture server running on a loopback listener.
pub struct CaptureServer {
    addr: SocketAddr,
    completions: mpsc::Receiver<Completion>,
    closed: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl CaptureServer {
    /// Start serving on `listener` in a background task.
    ///
    /// `consent_url` is where `/auth` redirects to; `expected_state` is the
    /// nonce every `/done` callback must echo back exactly.
    pub fn start(
        listener: TcpListener,
        consent_url: impl Into<String>,
        expected_state: impl Into<String>,
    ) -> Result<Self> {
        let addr = listener.local_addr().map_err(PromptError::Bind)?;
        let (tx, rx) = mpsc::channel(COMPLETION_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let closed = Arc::new(AtomicBool::new(false));

        let state = Arc::new(CaptureState {
            consent_url: consent_url.into(),
            expected_state: expected_state.into(),
            completions: tx,
            closed: closed.clone(),
        });

        let router = Router::new()
            .route(AUTH_PATH, any(redirect_to_consent))
            .route(DONE_PATH, get(handle_done).post(handle_done))
            .fallback(not_found)
            .with_state(state);

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        debug!(%addr, "callback server started");

        Ok(Self {
            addr,
            completions: rx,
            closed,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Local URL that redirects to the consent page.
    pub fn auth_url(&self) -> String {
        format!("http://{}{}", self.addr, AUTH_PATH)
    }

    /// Redirect URL to register with the provider.
    pub fn done_url(&self) -> String {
        format!("http://{}{}", self.addr, DONE_PATH)
    }

    /// Wait for the first completion, then close the listener.
    ///
    /// There is no timeout: this waits until the user finishes in the browser.
    pub async fn wait(mut self) -> Completion {
        let completion = self.completions.recv().await;
        self.close().await;

        completion.unwrap_or_else(|| {
            Err(PromptError::Server(
                "server stopped before a callback arrived".to_string(),
            ))
        })
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
                Ok(Ok(Err(e))) => warn!(error = %e, "callback server exited with error"),
                Ok(_) => {}
                Err(_) => {
                    warn!("callback server did not drain in time, aborting");
                    task.abort();
                }
            }
        }
        debug!(addr = %self.addr, "callback server closed");
    }
}

impl Drop for CaptureServer {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// Handlers

/// /auth - send the browser to the provider
async fn redirect_to_consent(State(state): State<Arc<CaptureState>>) -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, state.consent_url.clone())],
    )
        .into_response()
}

/// /done - provider callback
async fn handle_done(
    State(state): State<Arc<CaptureState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let form = is_form(&headers).then_some(&body[..]);
    let params = CallbackParams::parse(form, query.as_deref());

    if state.closed.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if params.state.as_deref() != Some(state.expected_state.as_str()) {
        warn!("callback state does not match");
        state.signal(Err(PromptError::StateMismatch));
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if let Some(code) = params.code.filter(|c| !c.is_empty()) {
        debug!("authorization code received");
        state.signal(Ok(code));
        return Html(SUCCESS_PAGE).into_response();
    }

    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        warn!(%error, "provider returned an error");
        state.signal(Err(PromptError::ProviderDenied {
            error,
            description: params.error_description,
        }));
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

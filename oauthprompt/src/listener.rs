//! Loopback listener on an OS-assigned port.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::error::{PromptError, Result};

/// Bind `127.0.0.1:0`, falling back to `[::1]:0`.
pub async fn bind_loopback() -> Result<TcpListener> {
    bind_with_fallback(
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        SocketAddr::from((Ipv6Addr::LOCALHOST, 0)),
    )
    .await
}

/// Bind `primary`, then `fallback` once. If both fail the error from
/// `primary` is returned.
pub async fn bind_with_fallback(primary: SocketAddr, fallback: SocketAddr) -> Result<TcpListener> {
    match TcpListener::bind(primary).await {
        Ok(listener) => {
            debug!(addr = %primary, "bound loopback listener");
            Ok(listener)
        }
        Err(first) => {
            warn!(addr = %primary, error = %first, "bind failed, trying fallback");
            match TcpListener::bind(fallback).await {
                Ok(listener) => Ok(listener),
                Err(_) => Err(PromptError::Bind(first)),
            }
        }
    }
}

/// Base URL (`http://host:port`) for a bound listener.
pub fn base_url(listener: &TcpListener) -> Result<String> {
    let addr = listener.local_addr().map_err(PromptError::Bind)?;
    Ok(format!("http://{addr}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // TEST-NET addresses are never assigned to a local interface.
    const UNBINDABLE_A: &str = "192.0.2.1:0";
    const UNBINDABLE_B: &str = "198.51.100.1:0";

    #[tokio::test]
    async fn test_binds_ephemeral_ipv4() {
        let listener = bind_loopback().await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_falls_back() {
        let listener = bind_with_fallback(
            UNBINDABLE_A.parse().unwrap(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        )
        .await
        .unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_reports_primary_error() {
        let primary: SocketAddr = UNBINDABLE_A.parse().unwrap();
        let expected = std::net::TcpListener::bind(primary).unwrap_err().kind();

        let err = bind_with_fallback(primary, UNBINDABLE_B.parse().unwrap())
            .await
            .unwrap_err();
        match err {
            PromptError::Bind(io) => assert_eq!(io.kind(), expected),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_base_url() {
        let listener = bind_loopback().await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert_eq!(base_url(&listener).unwrap(), format!("http://127.0.0.1:{port}"));
    }
}

//! Timeout helpers shared by every socket and child-process operation.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default bound for RCON connects and reads
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound for a Server List Ping round trip
pub const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound for short docker CLI calls (ps, top, stats)
pub const DOCKER_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for long docker CLI calls (compose up)
pub const DOCKER_LONG_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound for asset installers (steamcmd, downloads)
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);

/// Run a future under a timeout, mapping expiry to `ProtocolError::Timeout`.
pub async fn with_timeout<T, F>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)
}

/// Like [`with_timeout`] but for fallible futures, flattening the error.
pub async fn with_timeout_error<T, F>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_expires() {
        let result = with_timeout(tokio::time::sleep(Duration::from_millis(200)), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_inner_error_is_preserved() {
        let result: Result<()> = with_timeout_error(
            async { Err(ProtocolError::ConnectionClosed) },
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }
}

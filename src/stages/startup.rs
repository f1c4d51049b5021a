//! Server startup
//!
//! Starts (or restarts) the server, blocks until it reports ready and logs
//! its status.

use crate::ProvisionError;
use crate::server::ServerControlClient;
use tracing::info;

/// Start the server and wait for it to come up; returns the status output
pub async fn start_server(
    server: &dyn ServerControlClient,
    restart: bool,
) -> Result<String, ProvisionError> {
    if restart {
        server.restart().await?;
    } else {
        server.start().await?;
    }
    server.await_startup().await?;

    let status = server.status().await?;
    info!("CycleCloud server status: {}", status.trim());
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::mock::MockCycleServer;

    #[tokio::test]
    async fn test_start_sequence() {
        let server = MockCycleServer::new();
        let status = start_server(&server, false).await.unwrap();

        assert_eq!(status, "running");
        assert_eq!(server.state().await.calls, vec!["start", "await_startup", "status"]);
    }

    #[tokio::test]
    async fn test_restart_sequence() {
        let server = MockCycleServer::new();
        start_server(&server, true).await.unwrap();
        assert_eq!(server.state().await.calls[0], "restart");
    }

    #[tokio::test]
    async fn test_start_failure_stops_sequence() {
        let server = MockCycleServer::new().failing_start();
        assert!(start_server(&server, false).await.is_err());
        assert_eq!(server.state().await.calls, vec!["start"]);
    }
}

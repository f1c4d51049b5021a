//! Certificate provisioning
//!
//! Best effort: after a fixed warm-up the server is asked to obtain a
//! certificate through ACME. Any failure leaves the pre-existing self-signed
//! certificate in place and is never reported to the caller as an error.

use crate::server::ServerControlClient;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Result of the certificate step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum CertificateOutcome {
    /// A trusted certificate was installed
    Issued { fqdn: String },
    /// Acquisition failed; the self-signed certificate stays in use
    SelfSigned { reason: String },
    /// Nothing was attempted
    Skipped { reason: String },
}

/// Request a certificate for `hostname`, giving up after `timeout`
pub async fn provision_certificate(
    server: &dyn ServerControlClient,
    hostname: &str,
    location: &str,
    warmup: Duration,
    timeout: Duration,
) -> CertificateOutcome {
    if hostname.trim().is_empty() {
        return CertificateOutcome::Skipped {
            reason: "no public hostname".to_string(),
        };
    }

    info!(
        "Waiting {:?} for the server before requesting a certificate for {} ({})",
        warmup, hostname, location
    );
    tokio::time::sleep(warmup).await;

    let requested = match tokio::time::timeout(timeout, server.keystore_automatic(hostname)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!("no certificate after {:?}", timeout)),
    };

    match requested {
        Ok(()) => {
            info!("Installed Let's Encrypt certificate for {}", hostname);
            CertificateOutcome::Issued {
                fqdn: hostname.to_string(),
            }
        }
        Err(e) => {
            warn!("Error getting SSL cert from Let's Encrypt: {}", e);
            warn!("Proceeding with self-signed cert");
            CertificateOutcome::SelfSigned { reason: e }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::mock::MockCycleServer;

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_certificate_issued() {
        let server = MockCycleServer::new();
        let outcome =
            provision_certificate(&server, "cc.eastus.cloudapp.azure.com", "eastus", Duration::ZERO, LIMIT)
                .await;

        assert_eq!(
            outcome,
            CertificateOutcome::Issued {
                fqdn: "cc.eastus.cloudapp.azure.com".to_string()
            }
        );
        assert_eq!(
            server.state().await.calls,
            vec!["keystore automatic cc.eastus.cloudapp.azure.com"]
        );
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_self_signed() {
        let server = MockCycleServer::new().failing_keystore();
        let outcome = provision_certificate(&server, "cc.example.com", "eastus", Duration::ZERO, LIMIT).await;
        assert!(matches!(outcome, CertificateOutcome::SelfSigned { .. }));
    }

    #[tokio::test]
    async fn test_blank_hostname_skipped() {
        let server = MockCycleServer::new();
        let outcome = provision_certificate(&server, " ", "eastus", Duration::ZERO, LIMIT).await;
        assert!(matches!(outcome, CertificateOutcome::Skipped { .. }));
        assert!(server.state().await.calls.is_empty());
    }

    #[tokio::test]
    async fn test_hung_request_times_out() {
        let server = MockCycleServer::new().hanging_keystore();
        let outcome = provision_certificate(
            &server,
            "cc.example.com",
            "eastus",
            Duration::ZERO,
            Duration::from_millis(50),
        )
        .await;

        let CertificateOutcome::SelfSigned { reason } = outcome else {
            panic!("expected a self-signed fallback");
        };
        assert!(reason.contains("no certificate after"));
    }
}

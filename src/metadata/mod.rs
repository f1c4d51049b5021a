//! Instance metadata retrieval
//!
//! A [`MetadataSource`] answers a single request; [`fetch_metadata`] wraps it
//! in the bounded, fixed-delay retry loop and turns exhaustion into `None`.

pub mod azure;
pub mod mock;

use crate::config::Timings;
use crate::{InstanceMetadata, ProvisionError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A single-shot source of instance metadata
///
/// Transport failures and malformed responses are both reported as errors;
/// the retry loop treats them the same way.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Name of this source (e.g., "Azure IMDS")
    fn name(&self) -> &'static str;

    /// Perform one metadata request
    async fn fetch_once(&self) -> Result<InstanceMetadata, ProvisionError>;
}

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_timings(&Timings::default())
    }
}

impl RetryPolicy {
    pub fn from_timings(timings: &Timings) -> Self {
        Self {
            attempts: timings.metadata_attempts,
            delay: timings.metadata_retry_delay(),
        }
    }
}

/// Fetch instance metadata, retrying until the policy is exhausted
///
/// Never fails: running out of attempts yields `None`, which callers treat
/// as a signal to skip the steps that need metadata.
pub async fn fetch_metadata(
    source: &dyn MetadataSource,
    policy: &RetryPolicy,
) -> Option<InstanceMetadata> {
    for attempt in 1..=policy.attempts {
        debug!(
            "Fetching metadata from {} (attempt {}/{})",
            source.name(),
            attempt,
            policy.attempts
        );

        match source.fetch_once().await {
            Ok(metadata) => {
                info!(
                    "Instance metadata: subscription {}, location {}, resource group {}",
                    metadata.subscription_id, metadata.location, metadata.resource_group_name
                );
                return Some(metadata);
            }
            Err(e) => {
                warn!("Failed to get metadata: {}", e);
                if attempt < policy.attempts {
                    debug!("Retrying in {:?}", policy.delay);
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    warn!(
        "Unable to obtain metadata after {} attempts",
        policy.attempts
    );
    None
}

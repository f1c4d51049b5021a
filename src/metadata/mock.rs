//! Mock metadata source for testing
//!
//! Provides a scripted metadata source that can fail a fixed number of times
//! before answering, or never answer at all.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

use super::MetadataSource;
use crate::{InstanceMetadata, ProvisionError};

/// Mock metadata source
///
/// # Example
/// ```
/// use cyclecloud_provision::InstanceMetadata;
/// use cyclecloud_provision::metadata::mock::MockMetadataSource;
///
/// let mock = MockMetadataSource::new(InstanceMetadata {
///     subscription_id: "sub1".to_string(),
///     location: "eastus".to_string(),
///     resource_group_name: "rg1".to_string(),
/// })
/// .failing_first(3);
/// ```
pub struct MockMetadataSource {
    metadata: Option<InstanceMetadata>,
    failures: u32,
    attempts: AtomicU32,
}

impl MockMetadataSource {
    /// Source that answers with `metadata` on every attempt
    pub fn new(metadata: InstanceMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            failures: 0,
            attempts: AtomicU32::new(0),
        }
    }

    /// Source that never answers
    pub fn unavailable() -> Self {
        Self {
            metadata: None,
            failures: 0,
            attempts: AtomicU32::new(0),
        }
    }

    /// Fail the first `failures` attempts
    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    /// Number of attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for MockMetadataSource {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn fetch_once(&self) -> Result<InstanceMetadata, ProvisionError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(ProvisionError::Http(format!(
                "connection refused (attempt {})",
                attempt
            )));
        }
        self.metadata
            .clone()
            .ok_or_else(|| ProvisionError::Http("connection refused".to_string()))
    }
}

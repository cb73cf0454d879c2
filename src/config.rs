//! Composer Configuration
//!
//! Settings for the node composer, loadable from YAML. Every field has a
//! default so an empty document is a valid configuration.

use crate::error::{Error, Result};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Transaction Retry
// =============================================================================

/// Backoff applied when a transaction loses an optimistic race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionRetryConfig {
    /// First delay before rerunning
    pub initial_interval_ms: u64,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Upper bound for a single delay
    pub max_interval_ms: u64,
    /// Give up once this much time has passed since the first attempt
    pub max_elapsed_ms: u64,
}

impl Default for TransactionRetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 10,
            multiplier: 2.0,
            max_interval_ms: 500,
            max_elapsed_ms: 5_000,
        }
    }
}

impl TransactionRetryConfig {
    /// Build the backoff policy for one transaction
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_interval_ms))
            .with_multiplier(self.multiplier)
            .with_max_interval(Duration::from_millis(self.max_interval_ms))
            .with_max_elapsed_time(Some(Duration::from_millis(self.max_elapsed_ms)))
            .build()
    }

    fn validate(&self) -> Result<()> {
        if self.multiplier < 1.0 {
            return Err(Error::Configuration(format!(
                "transactionRetry.multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_interval_ms > self.max_interval_ms {
            return Err(Error::Configuration(
                "transactionRetry.initialIntervalMs exceeds maxIntervalMs".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Composer Configuration
// =============================================================================

/// Configuration for the node composer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComposerConfig {
    /// Retry policy for allocation and recovery transactions
    pub transaction_retry: TransactionRetryConfig,
}

impl ComposerConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.transaction_retry.validate()
    }
}

// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup validation for loaded configuration.
//!
//! Figment already enforces types and known keys; this pass catches values
//! that parse fine but make no operational sense.

use thiserror::Error;

use crate::model::TaskpilotConfig;

/// A single invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("config: {field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a loaded configuration, collecting every problem rather than
/// stopping at the first.
pub fn validate(config: &TaskpilotConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::new("storage.database_path", "must not be empty"));
    }
    if config.gemini.base_url.trim().is_empty() {
        errors.push(ConfigError::new("gemini.base_url", "must not be empty"));
    }
    if config.gemini.max_retries == 0 {
        errors.push(ConfigError::new("gemini.max_retries", "must be at least 1"));
    }
    if config.gemini.request_timeout_secs == 0 {
        errors.push(ConfigError::new(
            "gemini.request_timeout_secs",
            "must be at least 1",
        ));
    }
    if config.agent.confirmation_ttl_secs == 0 {
        errors.push(ConfigError::new(
            "agent.confirmation_ttl_secs",
            "must be at least 1",
        ));
    }
    if config.agent.context_token_budget == 0 {
        errors.push(ConfigError::new(
            "agent.context_token_budget",
            "must be at least 1",
        ));
    }
    if config.audit.retention_days == 0 {
        errors.push(ConfigError::new("audit.retention_days", "must be at least 1"));
    }
    if config.audit.cleanup_batch == 0 {
        errors.push(ConfigError::new("audit.cleanup_batch", "must be at least 1"));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration for the Taskpilot service.
//!
//! TOML files (XDG hierarchy) merged with `TASKPILOT_*` environment
//! variables via Figment, followed by a startup validation pass.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AgentConfig, AuditConfig, GeminiConfig, ServerConfig, StorageConfig, TaskpilotConfig,
};
pub use validation::{ConfigError, validate};

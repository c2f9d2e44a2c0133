// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./taskpilot.toml` > `~/.config/taskpilot/taskpilot.toml`
//! > `/etc/taskpilot/taskpilot.toml` with environment variable overrides via the
//! `TASKPILOT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TaskpilotConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/taskpilot/taskpilot.toml` (system-wide)
/// 3. `~/.config/taskpilot/taskpilot.toml` (user XDG config)
/// 4. `./taskpilot.toml` (local directory)
/// 5. `TASKPILOT_*` environment variables
pub fn load_config() -> Result<TaskpilotConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaskpilotConfig::default()))
        .merge(Toml::file("/etc/taskpilot/taskpilot.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("taskpilot/taskpilot.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("taskpilot.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no file or env lookup).
///
/// Used for testing and for loading an explicit config string.
pub fn load_config_from_str(toml_content: &str) -> Result<TaskpilotConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaskpilotConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TaskpilotConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaskpilotConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// CRITICAL: Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `TASKPILOT_SERVER_JWT_SECRET`
/// must map to `server.jwt_secret`, not `server.jwt.secret`.
fn env_provider() -> Env {
    Env::prefixed("TASKPILOT_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: TASKPILOT_GEMINI_API_KEY -> "gemini_api_key"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gemini_", "gemini.", 1)
            .replacen("agent_", "agent.", 1)
            .replacen("audit_", "audit.", 1);
        mapped.into()
    })
}

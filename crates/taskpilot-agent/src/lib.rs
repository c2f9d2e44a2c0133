// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent layer: the tool catalog, executor, authorization gate, context
//! assembly, audit trail, confirmation state machine, and the command
//! orchestrator that ties them together.

pub mod audit;
pub mod authz;
pub mod catalog;
pub mod confirm;
pub mod context;
pub mod executor;
pub mod orchestrator;

pub use audit::{AuditLog, HistoryFilter, UsageStats};
pub use authz::AuthGate;
pub use catalog::{DESTRUCTIVE_TOOLS, ToolCatalog, ToolSpec};
pub use confirm::ConfirmationManager;
pub use context::ContextAssembler;
pub use executor::ToolExecutor;
pub use orchestrator::CommandOrchestrator;

// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core error taxonomy, shared types, and provider trait for Taskpilot.
//!
//! Every other crate in the workspace depends on this one; it carries no
//! I/O of its own.

pub mod error;
pub mod traits;
pub mod types;

pub use error::AgentError;
pub use traits::ChatProvider;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, CommandOutcome, HealthStatus, Priority,
    RequestedToolCall, StatusFilter, ToolCallOutcome, ToolCallStatus,
};

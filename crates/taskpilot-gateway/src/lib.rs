// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Taskpilot assistant.
//!
//! Exposes the orchestrator over a JWT-authenticated REST surface and an
//! unauthenticated health endpoint.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{AuthState, Identity, encode_token, verify_token};
pub use handlers::AppState;
pub use server::{router, start_server};

// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for pluggable backends.

pub mod provider;

pub use provider::ChatProvider;

// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test helpers shared across Taskpilot crates.

pub mod mock_provider;

pub use mock_provider::{MockChatProvider, ScriptedReply};

use taskpilot_storage::Database;

/// Open a fresh migrated database in a temp directory.
///
/// Keep the returned [`tempfile::TempDir`] alive for the duration of the test.
pub async fn temp_database() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("test.db");
    let db = Database::open(path.to_str().expect("utf-8 path"))
        .await
        .expect("open test database");
    (db, dir)
}

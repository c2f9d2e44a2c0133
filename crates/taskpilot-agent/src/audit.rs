// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit trail over the tool-call log.
//!
//! Every executed or deferred tool call gets exactly one record. A failed
//! write surfaces as an audit-logging error; callers decide what to do with
//! it, but tool effects are never rolled back.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use taskpilot_core::{AgentError, ToolCallStatus};
use taskpilot_storage::{Database, NewToolCallLog, ToolCallLog, queries};

pub use taskpilot_storage::queries::audit::HistoryFilter;

/// Aggregate rows scanned per usage-stats query; bounds memory on the
/// load-and-aggregate path.
const STATS_SCAN_LIMIT: i64 = 10_000;

/// Usage statistics for one user over an optional period.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub error_calls: u64,
    pub pending_calls: u64,
    pub tool_usage: BTreeMap<String, u64>,
    pub average_execution_time_ms: Option<f64>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
}

/// Writes and reads the tool-call audit log.
pub struct AuditLog {
    db: Arc<Database>,
}

impl AuditLog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record one tool call. The write is unconditional; a failure is an
    /// audit-logging error the caller must not silently drop.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        user_id: &str,
        tool_name: &str,
        tool_params: &Value,
        result: Option<&Value>,
        status: ToolCallStatus,
        execution_time_ms: Option<f64>,
        error_details: Option<&Value>,
    ) -> Result<ToolCallLog, AgentError> {
        let log = NewToolCallLog {
            user_id: user_id.to_string(),
            tool_name: tool_name.to_string(),
            tool_params: tool_params.to_string(),
            result: result.map(Value::to_string),
            status: status.to_string(),
            execution_time_ms,
            error_details: error_details.map(Value::to_string),
        };
        queries::audit::insert_log(&self.db, log)
            .await
            .map_err(|e| AgentError::AuditLogging(format!("failed to write audit record: {e}")))
    }

    /// Record several calls in one transaction. All-or-nothing.
    pub async fn record_batch(
        &self,
        logs: Vec<NewToolCallLog>,
    ) -> Result<Vec<ToolCallLog>, AgentError> {
        queries::audit::insert_logs(&self.db, logs)
            .await
            .map_err(|e| AgentError::AuditLogging(format!("failed to write audit batch: {e}")))
    }

    /// Filtered history, newest first, plus the unpaginated total.
    pub async fn history(
        &self,
        user_id: &str,
        filter: HistoryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ToolCallLog>, i64), AgentError> {
        let logs =
            queries::audit::history(&self.db, user_id, filter.clone(), limit, offset).await?;
        let total = queries::audit::count_history(&self.db, user_id, filter).await?;
        Ok((logs, total))
    }

    /// Aggregate usage statistics over an optional period.
    pub async fn usage_stats(
        &self,
        user_id: &str,
        start: Option<String>,
        end: Option<String>,
    ) -> Result<UsageStats, AgentError> {
        let filter = HistoryFilter {
            start: start.clone(),
            end: end.clone(),
            ..Default::default()
        };
        let logs =
            queries::audit::history(&self.db, user_id, filter, STATS_SCAN_LIMIT, 0).await?;

        let mut stats = UsageStats {
            total_calls: 0,
            successful_calls: 0,
            error_calls: 0,
            pending_calls: 0,
            tool_usage: BTreeMap::new(),
            average_execution_time_ms: None,
            period_start: start,
            period_end: end,
        };
        let mut time_sum = 0.0;
        let mut time_count = 0u64;
        for log in &logs {
            stats.total_calls += 1;
            match log.status.as_str() {
                "success" => stats.successful_calls += 1,
                "error" => stats.error_calls += 1,
                "pending" => stats.pending_calls += 1,
                _ => {}
            }
            *stats.tool_usage.entry(log.tool_name.clone()).or_insert(0) += 1;
            if let Some(ms) = log.execution_time_ms {
                time_sum += ms;
                time_count += 1;
            }
        }
        if time_count > 0 {
            stats.average_execution_time_ms = Some(time_sum / time_count as f64);
        }
        Ok(stats)
    }

    /// Delete records older than the retention window, capped per call.
    /// Returns the number of rows removed.
    pub async fn cleanup(&self, retention_days: u32, max_batch: u32) -> Result<usize, AgentError> {
        let cutoff = (Utc::now() - Duration::days(retention_days as i64))
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        queries::audit::delete_older_than(&self.db, &cutoff, max_batch as i64).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskpilot_test_utils::temp_database;

    async fn setup() -> (AuditLog, tempfile::TempDir) {
        let (db, dir) = temp_database().await;
        (AuditLog::new(Arc::new(db)), dir)
    }

    #[tokio::test]
    async fn record_stores_serialized_fields() {
        let (audit, _dir) = setup().await;

        let stored = audit
            .record(
                "alice",
                "add_task",
                &json!({"title": "milk"}),
                Some(&json!({"success": true})),
                ToolCallStatus::Success,
                Some(4.2),
                None,
            )
            .await
            .unwrap();

        assert_eq!(stored.user_id, "alice");
        assert_eq!(stored.status, "success");
        assert_eq!(stored.tool_params, r#"{"title":"milk"}"#);
        assert_eq!(stored.execution_time_ms, Some(4.2));
    }

    #[tokio::test]
    async fn history_returns_total_for_pagination() {
        let (audit, _dir) = setup().await;
        for i in 0..7 {
            audit
                .record(
                    "alice",
                    "list_tasks",
                    &json!({"i": i}),
                    None,
                    ToolCallStatus::Success,
                    Some(1.0),
                    None,
                )
                .await
                .unwrap();
        }

        let (page, total) = audit
            .history("alice", HistoryFilter::default(), 3, 0)
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(total, 7);

        // Newest first.
        assert_eq!(page[0].tool_params, r#"{"i":6}"#);
    }

    #[tokio::test]
    async fn usage_stats_aggregates_by_status_and_tool() {
        let (audit, _dir) = setup().await;
        let entries = [
            ("add_task", ToolCallStatus::Success, Some(10.0)),
            ("add_task", ToolCallStatus::Success, Some(20.0)),
            ("delete_task", ToolCallStatus::Pending, None),
            ("update_task", ToolCallStatus::Error, Some(30.0)),
        ];
        for (tool, status, ms) in entries {
            audit
                .record("alice", tool, &json!({}), None, status, ms, None)
                .await
                .unwrap();
        }
        // Another user's rows must not leak into the stats.
        audit
            .record("bob", "add_task", &json!({}), None, ToolCallStatus::Success, None, None)
            .await
            .unwrap();

        let stats = audit.usage_stats("alice", None, None).await.unwrap();
        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.successful_calls, 2);
        assert_eq!(stats.error_calls, 1);
        assert_eq!(stats.pending_calls, 1);
        assert_eq!(stats.tool_usage["add_task"], 2);
        assert_eq!(stats.average_execution_time_ms, Some(20.0));
    }

    #[tokio::test]
    async fn cleanup_with_long_retention_deletes_nothing() {
        let (audit, _dir) = setup().await;
        audit
            .record("alice", "add_task", &json!({}), None, ToolCallStatus::Success, None, None)
            .await
            .unwrap();

        let deleted = audit.cleanup(90, 100).await.unwrap();
        assert_eq!(deleted, 0);

        let (_, total) = audit
            .history("alice", HistoryFilter::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn record_batch_is_transactional() {
        let (audit, _dir) = setup().await;
        let logs = vec![
            NewToolCallLog {
                user_id: "alice".into(),
                tool_name: "add_task".into(),
                tool_params: "{}".into(),
                result: None,
                status: "success".into(),
                execution_time_ms: None,
                error_details: None,
            },
            NewToolCallLog {
                user_id: "alice".into(),
                tool_name: "delete_task".into(),
                tool_params: "{}".into(),
                result: None,
                status: "pending".into(),
                execution_time_ms: None,
                error_details: None,
            },
        ];
        let stored = audit.record_batch(logs).await.unwrap();
        assert_eq!(stored.len(), 2);
    }
}

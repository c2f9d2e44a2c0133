// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed catalog of task tools exposed to the model.
//!
//! The catalog is pure data: names, descriptions, and JSON Schema parameter
//! definitions in OpenAI function format. Execution lives in
//! [`crate::executor`].

use serde_json::json;

/// Tools that destroy data and therefore require explicit confirmation.
pub const DESTRUCTIVE_TOOLS: &[&str] = &["delete_task"];

/// One catalog entry.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// The fixed set of task tools.
pub struct ToolCatalog {
    entries: Vec<ToolSpec>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        let entries = vec![
            ToolSpec {
                name: "add_task",
                description: "Create a new todo task for the user",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "title": {
                            "type": "string",
                            "description": "Task title, 1-200 characters"
                        },
                        "description": {
                            "type": "string",
                            "description": "Optional longer description"
                        },
                        "priority": {
                            "type": "string",
                            "enum": ["low", "medium", "high"],
                            "description": "Task priority, defaults to medium"
                        }
                    },
                    "required": ["title"]
                }),
            },
            ToolSpec {
                name: "list_tasks",
                description: "List the user's tasks, optionally filtered by completion status",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "status": {
                            "type": "string",
                            "enum": ["all", "pending", "completed"],
                            "description": "Which tasks to list, defaults to all"
                        }
                    },
                    "required": []
                }),
            },
            ToolSpec {
                name: "update_task",
                description: "Update the title, description, or priority of an existing task",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "task_id": {
                            "type": "integer",
                            "description": "Id of the task to update"
                        },
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "priority": {
                            "type": "string",
                            "enum": ["low", "medium", "high"]
                        }
                    },
                    "required": ["task_id"]
                }),
            },
            ToolSpec {
                name: "complete_task",
                description: "Mark a task as completed (or not completed)",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "task_id": {
                            "type": "integer",
                            "description": "Id of the task to complete"
                        },
                        "completed": {
                            "type": "boolean",
                            "description": "Completion state to set, defaults to true"
                        }
                    },
                    "required": ["task_id"]
                }),
            },
            ToolSpec {
                name: "delete_task",
                description: "Permanently delete a task. Destructive; requires confirmation",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "task_id": {
                            "type": "integer",
                            "description": "Id of the task to delete"
                        }
                    },
                    "required": ["task_id"]
                }),
            },
        ];
        Self { entries }
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.entries.iter().find(|spec| spec.name == name)
    }

    /// True when the tool is on the destructive allow-list.
    pub fn is_destructive(&self, name: &str) -> bool {
        DESTRUCTIVE_TOOLS.contains(&name)
    }

    /// OpenAI-format function definitions, sorted by name.
    pub fn definitions(&self) -> Vec<serde_json::Value> {
        let mut defs: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|spec| {
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": spec.parameters,
                    }
                })
            })
            .collect();
        defs.sort_by(|a, b| {
            a["function"]["name"]
                .as_str()
                .unwrap_or("")
                .cmp(b["function"]["name"].as_str().unwrap_or(""))
        });
        defs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

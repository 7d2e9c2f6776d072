/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Core execution types: the inbound `TaskRunExecution` payload and the
//! outbound success/failure result shapes.

use serde::{Deserialize, Serialize};

use crate::errors::TaskRunError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunExecutionUsage {
    #[serde(rename = "durationMs")]
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunExecutionRetry {
    pub timestamp: i64,
    pub delay: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: String,
    /// JSON-serialized payload string. Decoded by the run worker, never by
    /// this crate — the wire layer treats it as an opaque string.
    pub payload: String,
    #[serde(rename = "payloadType")]
    pub payload_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "isTest", default)]
    pub is_test: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptInfo {
    pub id: String,
    pub number: u32,
    #[serde(rename = "startedAt")]
    pub started_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationInfo {
    pub id: String,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    #[serde(rename = "ref")]
    pub project_ref: String,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentType {
    #[serde(rename = "PRODUCTION")]
    Production,
    #[serde(rename = "STAGING")]
    Staging,
    #[serde(rename = "DEVELOPMENT")]
    Development,
    #[serde(rename = "PREVIEW")]
    Preview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub id: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: EnvironmentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub id: String,
    #[serde(rename = "shortCode")]
    pub short_code: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInfo {
    pub id: String,
}

/// Inbound payload of an `EXECUTE_TASK_RUN` message.
///
/// Essential fields (`task`, `run`, `attempt`) are required; the rest are
/// progressive-expansion fields populated by the coordinator as its own
/// integration deepens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunExecution {
    pub task: TaskInfo,
    pub run: RunInfo,
    pub attempt: AttemptInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunSuccessfulExecutionResult {
    pub ok: bool,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(rename = "outputType")]
    pub output_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TaskRunExecutionUsage>,
    #[serde(
        default,
        rename = "taskIdentifier",
        skip_serializing_if = "Option::is_none"
    )]
    pub task_identifier: Option<String>,
}

impl TaskRunSuccessfulExecutionResult {
    pub fn new(id: impl Into<String>, output: Option<String>) -> Self {
        Self {
            ok: true,
            id: id.into(),
            output,
            output_type: "application/json".to_string(),
            usage: None,
            task_identifier: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunFailedExecutionResult {
    pub ok: bool,
    pub id: String,
    pub error: TaskRunError,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<TaskRunExecutionRetry>,
    #[serde(
        default,
        rename = "skippedRetrying",
        skip_serializing_if = "Option::is_none"
    )]
    pub skipped_retrying: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TaskRunExecutionUsage>,
    #[serde(
        default,
        rename = "taskIdentifier",
        skip_serializing_if = "Option::is_none"
    )]
    pub task_identifier: Option<String>,
}

impl TaskRunFailedExecutionResult {
    pub fn new(id: impl Into<String>, error: TaskRunError) -> Self {
        Self {
            ok: false,
            id: id.into(),
            error,
            retry: None,
            skipped_retrying: None,
            usage: None,
            task_identifier: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_result_defaults_output_type() {
        let r = TaskRunSuccessfulExecutionResult::new("run_1", Some("{}".to_string()));
        assert_eq!(r.output_type, "application/json");
        assert!(r.ok);
    }

    #[test]
    fn execution_round_trips_without_optional_fields() {
        let exec = TaskRunExecution {
            task: TaskInfo {
                id: "hello".to_string(),
                file_path: "/t.py".to_string(),
            },
            run: RunInfo {
                id: "run_1".to_string(),
                payload: "{\"name\":\"World\"}".to_string(),
                payload_type: "application/json".to_string(),
                tags: vec![],
                is_test: false,
            },
            attempt: AttemptInfo {
                id: "a1".to_string(),
                number: 1,
                started_at: "2024-01-01T00:00:00Z".to_string(),
            },
            batch: None,
            queue: None,
            organization: None,
            project: None,
            environment: None,
            deployment: None,
        };
        let json = serde_json::to_string(&exec).unwrap();
        assert!(!json.contains("batch"));
        let decoded: TaskRunExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.run.id, "run_1");
    }
}

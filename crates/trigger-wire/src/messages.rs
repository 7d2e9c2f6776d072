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

//! IPC message envelopes exchanged between worker and coordinator.

use serde::{Deserialize, Serialize};

use crate::common::{TaskRunExecution, TaskRunFailedExecutionResult, TaskRunSuccessfulExecutionResult};
use crate::resources::TaskResource;
use crate::WIRE_VERSION;

/// A log severity, or an arbitrary caller-chosen label.
///
/// Wire shape is always a bare string: `"DEBUG"`, `"INFO"`, `"WARN"`,
/// `"ERROR"`, or anything else a caller passes to `Logger::log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Custom(String),
}

impl LogLevel {
    pub fn custom(label: impl Into<String>) -> Self {
        LogLevel::Custom(label.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Custom(label) => label.as_str(),
        }
    }
}

impl From<&str> for LogLevel {
    fn from(raw: &str) -> Self {
        match raw {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARN" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            other => LogLevel::Custom(other.to_string()),
        }
    }
}

impl From<String> for LogLevel {
    fn from(raw: String) -> Self {
        LogLevel::from(raw.as_str())
    }
}

impl Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(LogLevel::from(String::deserialize(deserializer)?))
    }
}

/// A single entry in an indexer's `filePath` import failure list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportError {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub error: String,
}

/// The catalog emitted by the indexer, matching the TypeScript
/// `WorkerManifest` shape the coordinator expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerManifest {
    #[serde(rename = "configPath")]
    pub config_path: String,
    pub tasks: Vec<TaskResource>,
    #[serde(rename = "incompatiblePackages")]
    pub incompatible_packages: Vec<String>,
    #[serde(rename = "workerEntryPoint")]
    pub worker_entry_point: String,
    pub runtime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCompletePayload {
    pub manifest: WorkerManifest,
    #[serde(rename = "importErrors")]
    pub import_errors: Vec<ImportError>,
}

/// Worker → coordinator messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "TASK_RUN_COMPLETED")]
    TaskRunCompleted {
        version: String,
        completion: TaskRunSuccessfulExecutionResult,
    },
    #[serde(rename = "TASK_RUN_FAILED_TO_RUN")]
    TaskRunFailedToRun {
        version: String,
        completion: TaskRunFailedExecutionResult,
    },
    #[serde(rename = "TASK_HEARTBEAT")]
    TaskHeartbeat { version: String, id: String },
    /// One-shot indexer output (stdio transport).
    #[serde(rename = "INDEX_COMPLETE")]
    IndexComplete {
        version: String,
        payload: IndexCompletePayload,
    },
    /// Streaming/RPC-oriented indexer output. Both this and
    /// `IndexComplete` are real wire shapes observed in the reference
    /// implementation; the coordinator dispatches on `type`.
    #[serde(rename = "INDEX_TASKS_COMPLETE")]
    IndexTasksComplete {
        version: String,
        tasks: Vec<TaskResource>,
    },
    #[serde(rename = "LOG")]
    Log {
        version: String,
        level: LogLevel,
        message: String,
        logger: String,
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exception: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<LogTaskMetadata>,
    },
}

/// Task metadata automatically attached to a `LOG` message when emitted
/// from inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTaskMetadata {
    pub id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "attemptId")]
    pub attempt_id: String,
    #[serde(rename = "attemptNumber")]
    pub attempt_number: u32,
}

impl WorkerMessage {
    pub fn task_run_completed(completion: TaskRunSuccessfulExecutionResult) -> Self {
        WorkerMessage::TaskRunCompleted {
            version: WIRE_VERSION.to_string(),
            completion,
        }
    }

    pub fn task_run_failed(completion: TaskRunFailedExecutionResult) -> Self {
        WorkerMessage::TaskRunFailedToRun {
            version: WIRE_VERSION.to_string(),
            completion,
        }
    }

    pub fn heartbeat(id: impl Into<String>) -> Self {
        WorkerMessage::TaskHeartbeat {
            version: WIRE_VERSION.to_string(),
            id: id.into(),
        }
    }

    pub fn index_complete(payload: IndexCompletePayload) -> Self {
        WorkerMessage::IndexComplete {
            version: WIRE_VERSION.to_string(),
            payload,
        }
    }
}

/// Coordinator → worker messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinatorMessage {
    #[serde(rename = "EXECUTE_TASK_RUN")]
    ExecuteTaskRun {
        version: String,
        execution: TaskRunExecution,
    },
    #[serde(rename = "CANCEL")]
    Cancel { version: String },
    #[serde(rename = "FLUSH")]
    Flush { version: String },
}

impl CoordinatorMessage {
    /// The string discriminator, used for handler lookup in the IPC core.
    pub fn type_tag(&self) -> &'static str {
        match self {
            CoordinatorMessage::ExecuteTaskRun { .. } => "EXECUTE_TASK_RUN",
            CoordinatorMessage::Cancel { .. } => "CANCEL",
            CoordinatorMessage::Flush { .. } => "FLUSH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TaskRunError;

    #[test]
    fn heartbeat_round_trips() {
        let msg = WorkerMessage::heartbeat("run_7");
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: WorkerMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            WorkerMessage::TaskHeartbeat { id, version } => {
                assert_eq!(id, "run_7");
                assert_eq!(version, "v1");
            }
            _ => panic!("expected TaskHeartbeat"),
        }
    }

    #[test]
    fn cancel_message_decodes_from_literal() {
        let raw = r#"{"type":"CANCEL","version":"v1"}"#;
        let decoded: CoordinatorMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(decoded.type_tag(), "CANCEL");
    }

    #[test]
    fn unknown_coordinator_type_is_rejected() {
        let raw = r#"{"type":"NOT_A_REAL_TYPE","version":"v1"}"#;
        let decoded: Result<CoordinatorMessage, _> = serde_json::from_str(raw);
        assert!(decoded.is_err());
    }

    #[test]
    fn task_run_failed_round_trips_with_cancelled_error() {
        use crate::common::TaskRunFailedExecutionResult;
        let msg = WorkerMessage::task_run_failed(TaskRunFailedExecutionResult::new(
            "run_1",
            TaskRunError::cancelled(),
        ));
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: WorkerMessage = serde_json::from_str(&json).unwrap();
        match decoded {
            WorkerMessage::TaskRunFailedToRun { completion, .. } => {
                assert!(!completion.ok);
                assert_eq!(completion.id, "run_1");
            }
            _ => panic!("expected TaskRunFailedToRun"),
        }
    }

    #[test]
    fn standard_log_levels_serialize_as_bare_strings() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"WARN\"");
    }

    #[test]
    fn custom_log_level_round_trips() {
        let level = LogLevel::custom("TRACE");
        let json = serde_json::to_string(&level).unwrap();
        assert_eq!(json, "\"TRACE\"");
        let decoded: LogLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, LogLevel::Custom("TRACE".to_string()));
    }

    #[test]
    fn known_level_strings_decode_to_standard_variants() {
        let decoded: LogLevel = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(decoded, LogLevel::Error);
    }
}

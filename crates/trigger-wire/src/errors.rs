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

//! `TaskRunError` wire types and the error-code enumeration.

use serde::{Deserialize, Serialize};

/// Enumerated codes for `INTERNAL_ERROR` classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskRunErrorCode {
    #[serde(rename = "COULD_NOT_IMPORT_TASK")]
    CouldNotImportTask,
    #[serde(rename = "TASK_EXECUTION_FAILED")]
    TaskExecutionFailed,
    #[serde(rename = "TASK_RUN_CANCELLED")]
    TaskRunCancelled,
    #[serde(rename = "MAX_DURATION_EXCEEDED")]
    MaxDurationExceeded,
    #[serde(rename = "TASK_PROCESS_EXITED_WITH_NON_ZERO_CODE")]
    TaskProcessExitedWithNonZeroCode,
    #[serde(rename = "TASK_INPUT_ERROR")]
    TaskInputError,
    #[serde(rename = "TASK_OUTPUT_ERROR")]
    TaskOutputError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Tagged union of the three wire error shapes. First-match classification
/// rules live in `trigger_runtime::error_mapper`, not here — this type is
/// pure wire data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskRunError {
    #[serde(rename = "BUILT_IN_ERROR")]
    BuiltIn {
        name: String,
        message: String,
        #[serde(rename = "stackTrace")]
        stack_trace: String,
    },
    #[serde(rename = "INTERNAL_ERROR")]
    Internal {
        code: TaskRunErrorCode,
        #[serde(default)]
        message: String,
        #[serde(default, rename = "stackTrace")]
        stack_trace: String,
    },
    #[serde(rename = "STRING_ERROR")]
    StringError { raw: String },
}

impl TaskRunError {
    /// The `INTERNAL_ERROR` variant used for cooperative cancellation.
    pub fn cancelled() -> Self {
        TaskRunError::Internal {
            code: TaskRunErrorCode::TaskRunCancelled,
            message: "Task cancelled".to_string(),
            stack_trace: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_error_round_trips() {
        let err = TaskRunError::BuiltIn {
            name: "ValueError".to_string(),
            message: "bad".to_string(),
            stack_trace: "Traceback...".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"BUILT_IN_ERROR\""));
        let decoded: TaskRunError = serde_json::from_str(&json).unwrap();
        match decoded {
            TaskRunError::BuiltIn { name, message, .. } => {
                assert_eq!(name, "ValueError");
                assert_eq!(message, "bad");
            }
            _ => panic!("expected BuiltIn variant"),
        }
    }

    #[test]
    fn internal_error_code_serializes_to_exact_tag() {
        let err = TaskRunError::cancelled();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "TASK_RUN_CANCELLED");
    }

    #[test]
    fn unknown_type_tag_fails_to_decode() {
        let raw = r#"{"type":"WHATEVER_ERROR","raw":"x"}"#;
        let decoded: Result<TaskRunError, _> = serde_json::from_str(raw);
        assert!(decoded.is_err());
    }
}

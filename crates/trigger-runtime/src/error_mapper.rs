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

//! Host-exception → wire-error taxonomy conversion.
//!
//! `TaskFailure` is the host-side (non-wire) classification produced by
//! the run worker while driving a task through its lifecycle; this module
//! is the single place that knows how a `TaskFailure` projects onto the
//! `TaskRunError` wire union. Classification itself happens at the call
//! site (the run worker already knows *which* of spec.md §4.4's eight
//! rules applies from the stage that failed); this keeps the ordering
//! explicit instead of re-deriving it from a type hierarchy that Rust,
//! unlike the source language, does not give us for free.

use thiserror::Error;

use trigger_wire::{TaskRunError, TaskRunErrorCode};

#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("task run cancelled")]
    Cancelled,

    #[error("could not import task: {0}")]
    CouldNotImportTask(String),

    #[error("task process exited with non-zero code: {0}")]
    ProcessExited(i32),

    #[error("task input error: {0}")]
    InputError(String),

    #[error("task output error: {0}")]
    OutputError(String),

    #[error("max duration exceeded")]
    MaxDurationExceeded,

    /// A recognized host-level fault, the Rust analogue of the source
    /// SDK's built-in exception classes (a caught panic, for instance).
    #[error("{name}: {message}")]
    BuiltIn {
        name: String,
        message: String,
        stack_trace: String,
    },

    /// Catch-all: any other user-code failure. Always ends up as
    /// `INTERNAL_ERROR/TASK_EXECUTION_FAILED` unless no stack trace can
    /// be recovered, in which case it degrades to `STRING_ERROR`.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl TaskFailure {
    /// Build a `BuiltIn` failure from a caught panic payload, the closest
    /// Rust equivalent to a recognized built-in exception type.
    pub fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic payload was not a string".to_string()
        };
        TaskFailure::BuiltIn {
            name: "Panic".to_string(),
            message,
            stack_trace: std::backtrace::Backtrace::force_capture().to_string(),
        }
    }
}

/// Classify a `TaskFailure` into the wire `TaskRunError` taxonomy.
/// Implements spec.md §4.4's eight rules; the match arms are listed in
/// the same priority order even though each `TaskFailure` variant is
/// already unambiguous, so the ordering stays auditable against the spec.
pub fn map_exception(failure: TaskFailure) -> TaskRunError {
    match failure {
        TaskFailure::Cancelled => TaskRunError::Internal {
            code: TaskRunErrorCode::TaskRunCancelled,
            message: "Task cancelled".to_string(),
            stack_trace: String::new(),
        },
        TaskFailure::CouldNotImportTask(reason) => TaskRunError::Internal {
            code: TaskRunErrorCode::CouldNotImportTask,
            message: reason,
            stack_trace: String::new(),
        },
        TaskFailure::ProcessExited(code) => TaskRunError::Internal {
            code: TaskRunErrorCode::TaskProcessExitedWithNonZeroCode,
            message: format!("process exited with code {code}"),
            stack_trace: String::new(),
        },
        TaskFailure::InputError(reason) => TaskRunError::Internal {
            code: TaskRunErrorCode::TaskInputError,
            message: reason,
            stack_trace: String::new(),
        },
        TaskFailure::OutputError(reason) => TaskRunError::Internal {
            code: TaskRunErrorCode::TaskOutputError,
            message: reason,
            stack_trace: String::new(),
        },
        TaskFailure::MaxDurationExceeded => TaskRunError::Internal {
            code: TaskRunErrorCode::MaxDurationExceeded,
            message: "max duration exceeded".to_string(),
            stack_trace: String::new(),
        },
        TaskFailure::BuiltIn {
            name,
            message,
            stack_trace,
        } => TaskRunError::BuiltIn {
            name,
            message,
            stack_trace,
        },
        TaskFailure::Execution(err) => {
            let stack_trace = format!("{err:?}");
            if stack_trace.is_empty() {
                TaskRunError::StringError {
                    raw: err.to_string(),
                }
            } else {
                TaskRunError::Internal {
                    code: TaskRunErrorCode::TaskExecutionFailed,
                    message: err.to_string(),
                    stack_trace,
                }
            }
        }
    }
}

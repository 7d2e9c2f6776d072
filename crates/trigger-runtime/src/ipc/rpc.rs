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

//! Bidirectional gRPC streaming transport.
//!
//! The worker is the client: it dials the coordinator's `WorkerService`
//! and opens one long-lived `Connect` stream for the lifetime of the
//! process, matching how the job-worker client in this codebase's other
//! gRPC services connects outward rather than listening inbound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Request;

use trigger_wire::{
    AttemptInfo, BatchInfo, CoordinatorMessage, DeploymentInfo, EnvironmentInfo, EnvironmentType,
    OrganizationInfo, ProjectInfo, QueueInfo, RunInfo, TaskInfo, TaskResource, TaskRunError,
    TaskRunErrorCode, TaskRunExecution, TaskRunExecutionUsage, TaskRunFailedExecutionResult,
    TaskRunSuccessfulExecutionResult, WorkerMessage,
};

use crate::proto::worker_service_client::WorkerServiceClient;
use crate::proto::{self as pb};

use super::dispatch::HandlerRegistry;
use super::{Handler, IpcConnection};

pub struct RpcTransport {
    outbound: mpsc::Sender<pb::WorkerMessage>,
    inbound: tokio::sync::Mutex<Option<tonic::Streaming<pb::CoordinatorMessage>>>,
    handlers: HandlerRegistry,
    stopped: AtomicBool,
}

impl RpcTransport {
    /// Dial `address` and open the bidirectional stream. Fails fast —
    /// there is no retry loop here; startup failure is a hard error
    /// (spec.md §9: the RPC address must be discoverable up front).
    pub async fn connect(address: String) -> anyhow::Result<Arc<Self>> {
        let channel = Channel::from_shared(address)?.connect_lazy();
        let mut client = WorkerServiceClient::new(channel);

        let (tx, rx) = mpsc::channel::<pb::WorkerMessage>(64);
        let outbound_stream = ReceiverStream::new(rx);
        let response = client.connect(Request::new(outbound_stream)).await?;
        let inbound = response.into_inner();

        Ok(Arc::new(Self {
            outbound: tx,
            inbound: tokio::sync::Mutex::new(Some(inbound)),
            handlers: HandlerRegistry::new(),
            stopped: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl IpcConnection for RpcTransport {
    async fn send(&self, message: WorkerMessage) -> anyhow::Result<()> {
        let frame = encode_worker_message(message);
        self.outbound
            .send(frame)
            .await
            .map_err(|_| anyhow::anyhow!("rpc outbound channel closed"))
    }

    async fn start_listening(&self) -> anyhow::Result<()> {
        let mut guard = self.inbound.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("start_listening called twice on the same connection"))?;

        while !self.stopped.load(Ordering::SeqCst) {
            match stream.message().await? {
                Some(frame) => match decode_coordinator_message(frame) {
                    Ok(message) => self.handlers.dispatch(message).await,
                    Err(err) => tracing::warn!(error = %err, "failed to decode coordinator frame"),
                },
                None => break,
            }
        }
        Ok(())
    }

    fn on(&self, message_type: &str, handler: Handler) {
        self.handlers.on_handler(message_type, handler);
    }

    async fn flush(&self, timeout: Duration) -> anyhow::Result<()> {
        // The outbound side is a bounded channel already drained by tonic
        // as fast as the wire allows; there is no separate buffer to wait
        // out beyond the channel itself becoming empty.
        tokio::time::timeout(timeout, self.outbound.reserve())
            .await
            .ok();
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------
// trigger_wire <-> generated proto translation
// ---------------------------------------------------------------------

fn encode_worker_message(message: WorkerMessage) -> pb::WorkerMessage {
    use pb::worker_message::Message as Inner;
    let inner = match message {
        WorkerMessage::TaskRunCompleted { version, completion } => {
            Inner::TaskRunCompleted(pb::TaskRunCompleted {
                version,
                completion: Some(encode_success_result(completion)),
            })
        }
        WorkerMessage::TaskRunFailedToRun { version, completion } => {
            Inner::TaskRunFailed(pb::TaskRunFailedToRun {
                version,
                completion: Some(encode_failed_result(completion)),
            })
        }
        WorkerMessage::TaskHeartbeat { version, id } => {
            Inner::TaskHeartbeat(pb::TaskHeartbeat { version, id })
        }
        WorkerMessage::IndexComplete { payload, .. } => {
            // The RPC transport only ever carries the streaming shape;
            // an INDEX_COMPLETE produced while on this transport is
            // re-emitted as INDEX_TASKS_COMPLETE instead of dropped.
            Inner::IndexTasksComplete(pb::IndexTasksComplete {
                version: trigger_wire::WIRE_VERSION.to_string(),
                tasks: payload.manifest.tasks.into_iter().map(encode_task_resource).collect(),
            })
        }
        WorkerMessage::IndexTasksComplete { version, tasks } => {
            Inner::IndexTasksComplete(pb::IndexTasksComplete {
                version,
                tasks: tasks.into_iter().map(encode_task_resource).collect(),
            })
        }
        WorkerMessage::Log {
            version,
            level,
            message,
            logger,
            timestamp,
            exception,
            ..
        } => Inner::Log(pb::LogMessage {
            version,
            level: level.as_str().to_string(),
            message,
            logger,
            timestamp,
            exception,
        }),
    };
    pb::WorkerMessage { message: Some(inner) }
}

fn encode_success_result(r: TaskRunSuccessfulExecutionResult) -> pb::TaskRunSuccessResult {
    pb::TaskRunSuccessResult {
        id: r.id,
        output: r.output,
        output_type: r.output_type,
        usage: r.usage.map(encode_usage),
        task_identifier: r.task_identifier,
    }
}

fn encode_failed_result(r: TaskRunFailedExecutionResult) -> pb::TaskRunFailedResult {
    pb::TaskRunFailedResult {
        id: r.id,
        error: Some(encode_task_run_error(r.error)),
        usage: r.usage.map(encode_usage),
        task_identifier: r.task_identifier,
    }
}

fn encode_usage(u: TaskRunExecutionUsage) -> pb::TaskRunExecutionUsage {
    pb::TaskRunExecutionUsage { duration_ms: u.duration_ms }
}

fn encode_task_run_error(err: TaskRunError) -> pb::TaskRunError {
    use pb::task_run_error::Error as Inner;
    let inner = match err {
        TaskRunError::BuiltIn { name, message, stack_trace } => {
            Inner::BuiltInError(pb::BuiltInError { name, message, stack_trace })
        }
        TaskRunError::Internal { code, message, stack_trace } => {
            Inner::InternalError(pb::InternalError {
                code: error_code_to_wire_string(code),
                message,
                stack_trace,
            })
        }
        TaskRunError::StringError { raw } => Inner::StringError(pb::StringError { raw }),
    };
    pb::TaskRunError { error: Some(inner) }
}

fn error_code_to_wire_string(code: TaskRunErrorCode) -> String {
    match code {
        TaskRunErrorCode::CouldNotImportTask => "COULD_NOT_IMPORT_TASK",
        TaskRunErrorCode::TaskExecutionFailed => "TASK_EXECUTION_FAILED",
        TaskRunErrorCode::TaskRunCancelled => "TASK_RUN_CANCELLED",
        TaskRunErrorCode::MaxDurationExceeded => "MAX_DURATION_EXCEEDED",
        TaskRunErrorCode::TaskProcessExitedWithNonZeroCode => "TASK_PROCESS_EXITED_WITH_NON_ZERO_CODE",
        TaskRunErrorCode::TaskInputError => "TASK_INPUT_ERROR",
        TaskRunErrorCode::TaskOutputError => "TASK_OUTPUT_ERROR",
        TaskRunErrorCode::InternalError => "INTERNAL_ERROR",
    }
    .to_string()
}

/// Inverse of [`error_code_to_wire_string`]. The worker never decodes a
/// `TaskRunError` off the wire — that value only ever flows outbound — so
/// this only exists to keep the round-trip tested; not part of any live
/// decode path.
#[cfg(test)]
fn error_code_from_wire_string(code: &str) -> TaskRunErrorCode {
    match code {
        "COULD_NOT_IMPORT_TASK" => TaskRunErrorCode::CouldNotImportTask,
        "TASK_EXECUTION_FAILED" => TaskRunErrorCode::TaskExecutionFailed,
        "TASK_RUN_CANCELLED" => TaskRunErrorCode::TaskRunCancelled,
        "MAX_DURATION_EXCEEDED" => TaskRunErrorCode::MaxDurationExceeded,
        "TASK_PROCESS_EXITED_WITH_NON_ZERO_CODE" => TaskRunErrorCode::TaskProcessExitedWithNonZeroCode,
        "TASK_INPUT_ERROR" => TaskRunErrorCode::TaskInputError,
        "TASK_OUTPUT_ERROR" => TaskRunErrorCode::TaskOutputError,
        _ => TaskRunErrorCode::InternalError,
    }
}

fn encode_task_resource(t: TaskResource) -> pb::TaskResource {
    pb::TaskResource {
        id: t.id,
        file_path: t.file_path,
        export_name: t.export_name,
        entry_point: t.entry_point,
        description: t.description,
        queue: t.queue.map(|q| pb::QueueConfig {
            name: q.name,
            concurrency_limit: q.concurrency_limit,
        }),
        retry: t.retry.map(|r| pb::RetryConfig {
            max_attempts: r.max_attempts,
            min_timeout_in_ms: r.min_timeout_in_ms,
            max_timeout_in_ms: r.max_timeout_in_ms,
            factor: r.factor,
            randomize: r.randomize,
        }),
        max_duration: t.max_duration,
    }
}

fn decode_coordinator_message(frame: pb::CoordinatorMessage) -> anyhow::Result<CoordinatorMessage> {
    use pb::coordinator_message::Message as Inner;
    let inner = frame
        .message
        .ok_or_else(|| anyhow::anyhow!("coordinator frame had no message set"))?;

    Ok(match inner {
        Inner::ExecuteTaskRun(msg) => CoordinatorMessage::ExecuteTaskRun {
            version: msg.version,
            execution: decode_execution(
                msg.execution
                    .ok_or_else(|| anyhow::anyhow!("ExecuteTaskRun missing execution"))?,
            )?,
        },
        Inner::Cancel(msg) => CoordinatorMessage::Cancel { version: msg.version },
        Inner::Flush(msg) => CoordinatorMessage::Flush { version: msg.version },
    })
}

fn decode_execution(execution: pb::TaskRunExecution) -> anyhow::Result<TaskRunExecution> {
    let task = execution
        .task
        .ok_or_else(|| anyhow::anyhow!("execution missing task"))?;
    let run = execution
        .run
        .ok_or_else(|| anyhow::anyhow!("execution missing run"))?;
    let attempt = execution
        .attempt
        .ok_or_else(|| anyhow::anyhow!("execution missing attempt"))?;

    Ok(TaskRunExecution {
        task: TaskInfo {
            id: task.id,
            file_path: task.file_path,
        },
        run: RunInfo {
            id: run.id,
            payload: run.payload,
            payload_type: run.payload_type,
            tags: run.tags,
            is_test: run.is_test,
        },
        attempt: AttemptInfo {
            id: attempt.id,
            number: attempt.number,
            started_at: attempt.started_at,
        },
        batch: execution.batch.map(|b| BatchInfo { id: b.id }),
        queue: execution.queue.map(|q| QueueInfo { id: q.id, name: q.name }),
        organization: execution.organization.map(|o| OrganizationInfo {
            id: o.id,
            slug: o.slug,
            name: o.name,
        }),
        project: execution.project.map(|p| ProjectInfo {
            id: p.id,
            project_ref: p.ref_,
            slug: p.slug,
            name: p.name,
        }),
        environment: execution.environment.map(|e| EnvironmentInfo {
            id: e.id,
            slug: e.slug,
            kind: decode_environment_type(e.r#type),
        }),
        deployment: execution.deployment.map(|d| DeploymentInfo {
            id: d.id,
            short_code: d.short_code,
            version: d.version,
        }),
    })
}

fn decode_environment_type(raw: i32) -> EnvironmentType {
    match pb::EnvironmentType::try_from(raw).unwrap_or(pb::EnvironmentType::Unspecified) {
        pb::EnvironmentType::Production => EnvironmentType::Production,
        pb::EnvironmentType::Staging => EnvironmentType::Staging,
        pb::EnvironmentType::Development => EnvironmentType::Development,
        pb::EnvironmentType::Preview => EnvironmentType::Preview,
        pb::EnvironmentType::Unspecified => EnvironmentType::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_round_trips_through_wire_string() {
        for code in [
            TaskRunErrorCode::CouldNotImportTask,
            TaskRunErrorCode::TaskExecutionFailed,
            TaskRunErrorCode::TaskRunCancelled,
            TaskRunErrorCode::MaxDurationExceeded,
            TaskRunErrorCode::TaskProcessExitedWithNonZeroCode,
            TaskRunErrorCode::TaskInputError,
            TaskRunErrorCode::TaskOutputError,
            TaskRunErrorCode::InternalError,
        ] {
            let wire = error_code_to_wire_string(code);
            let back = error_code_from_wire_string(&wire);
            assert_eq!(format!("{back:?}"), format!("{code:?}"));
        }
    }

    #[test]
    fn encode_task_resource_preserves_entry_point_duplication() {
        let resource = TaskResource::new("hello", "/t.py");
        let encoded = encode_task_resource(resource);
        assert_eq!(encoded.entry_point, "/t.py");
        assert_eq!(encoded.export_name, "hello");
    }

    #[test]
    fn unspecified_environment_type_falls_back_to_development() {
        assert_eq!(decode_environment_type(0), EnvironmentType::Development);
    }
}

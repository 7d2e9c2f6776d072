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

//! Single-run state machine:
//!
//! ```text
//! IDLE  --EXECUTE_TASK_RUN-->  LOADING
//! LOADING  --ok-->             RUNNING       (heartbeat loop started)
//! LOADING  --err-->            TERMINAL(failure, COULD_NOT_IMPORT_TASK)
//! RUNNING  --success-->        TERMINAL(success)
//! RUNNING  --err-->             TERMINAL(failure, classified)
//! RUNNING  --CANCEL/signal-->   CANCELLING
//! CANCELLING --drained-->       TERMINAL(failure, TASK_RUN_CANCELLED)
//! TERMINAL  --send+flush-->     EXIT
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use trigger_wire::{CoordinatorMessage, TaskRunExecution};

use crate::config::HEARTBEAT_INTERVAL;
use crate::context::{self, TaskContext};
use crate::error_mapper::{map_exception, TaskFailure};
use crate::ipc::{into_handler, IpcConnection};
use crate::registry;

/// Drives exactly one task attempt from `EXECUTE_TASK_RUN` to process
/// exit. Not reused across runs — one `RunWorker` per worker process,
/// matching the one-attempt-per-process lifetime (spec.md §9).
pub struct RunWorker {
    connection: Arc<dyn IpcConnection>,
    cancelled: Arc<AtomicBool>,
    cancel_token: CancellationToken,
}

impl RunWorker {
    pub fn new(connection: Arc<dyn IpcConnection>) -> Arc<Self> {
        Arc::new(Self {
            connection,
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Register handlers and start listening. Returns once the
    /// connection's read loop ends (EOF) or the run has fully completed
    /// and flushed — whichever happens first in practice is the latter,
    /// since the coordinator closes the stream only after seeing the
    /// terminal message.
    pub async fn run(self: &Arc<Self>) -> anyhow::Result<()> {
        let execute_worker = self.clone();
        self.connection.on(
            "EXECUTE_TASK_RUN",
            into_handler(move |message| {
                let worker = execute_worker.clone();
                async move {
                    if let CoordinatorMessage::ExecuteTaskRun { execution, .. } = message {
                        worker.handle_execute(execution).await;
                    }
                }
            }),
        );

        let cancel_worker = self.clone();
        self.connection.on(
            "CANCEL",
            into_handler(move |_message| {
                let worker = cancel_worker.clone();
                async move {
                    worker.cancel();
                }
            }),
        );

        self.connection.start_listening().await
    }

    /// Idempotent cancellation, triggered by either a `CANCEL` wire
    /// message or an installed OS signal handler.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.cancel_token.cancel();
        }
    }

    async fn handle_execute(self: &Arc<Self>, execution: TaskRunExecution) {
        let run_id = execution.run.id.clone();
        let started_at = Instant::now();

        let ctx = TaskContext::from_execution(&execution);
        let task_id = ctx.task.id.clone();

        let heartbeat_handle = self.spawn_heartbeat(run_id.clone());

        let outcome = context::scope(ctx, self.execute_with_cancellation(&task_id, &execution)).await;

        heartbeat_handle.abort();
        context::clear_current();

        let duration_ms = started_at.elapsed().as_millis() as i64;

        match outcome {
            Ok(output) => {
                let _ = self
                    .connection
                    .send_completed(&run_id, Some(output), duration_ms)
                    .await;
            }
            Err(failure) => {
                let wire_error = map_exception(failure);
                let _ = self.connection.send_failed(&run_id, wire_error, duration_ms).await;
            }
        }

        let _ = self.connection.flush(Duration::from_secs(5)).await;
        self.connection.stop();
    }

    /// Decode the payload, look up the task, and run it — racing against
    /// both cooperative cancellation and `maxDuration`, whichever fires
    /// first.
    async fn execute_with_cancellation(
        &self,
        task_id: &str,
        execution: &TaskRunExecution,
    ) -> Result<String, TaskFailure> {
        let payload: serde_json::Value = serde_json::from_str(&execution.run.payload)
            .map_err(|err| TaskFailure::InputError(err.to_string()))?;

        let handler = registry::get_task(task_id)
            .ok_or_else(|| TaskFailure::CouldNotImportTask(format!("task `{task_id}` not found in registry")))?;

        let resource = registry::list_resources()
            .into_iter()
            .find(|r| r.id == task_id);
        let max_duration = resource.and_then(|r| r.max_duration);

        let body = handler.execute(payload);

        let result = match max_duration {
            Some(seconds) => {
                tokio::select! {
                    biased;
                    _ = self.cancel_token.cancelled() => return Err(TaskFailure::Cancelled),
                    _ = tokio::time::sleep(Duration::from_secs(seconds)) => {
                        return Err(TaskFailure::MaxDurationExceeded)
                    }
                    result = body => result,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.cancel_token.cancelled() => return Err(TaskFailure::Cancelled),
                    result = body => result,
                }
            }
        };

        let value = result.map_err(TaskFailure::Execution)?;
        serde_json::to_string(&value).map_err(|err| TaskFailure::OutputError(err.to_string()))
    }

    fn spawn_heartbeat(&self, run_id: String) -> tokio::task::JoinHandle<()> {
        let connection = self.connection.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                if let Err(err) = connection.send_heartbeat(&run_id).await {
                    tracing::warn!(error = %err, run_id, "heartbeat send failed, continuing");
                }
            }
        })
    }
}

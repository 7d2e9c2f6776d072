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

//! Transport-agnostic IPC abstraction, plus its two transports.

pub mod dispatch;
pub mod rpc;
pub mod stdio;

use std::time::Duration;

use async_trait::async_trait;

use trigger_wire::{
    TaskRunExecutionUsage, TaskRunFailedExecutionResult, TaskRunSuccessfulExecutionResult,
    WorkerMessage,
};

pub use dispatch::{into_handler, Handler};

/// Abstract bidirectional message channel between worker and coordinator.
///
/// Both `StdioTransport` and `RpcTransport` implement this identically;
/// the run worker and indexer program against the trait only, so the
/// transport is chosen once at process entry and never mixed within one
/// worker lifetime (spec.md §9).
///
/// `on` takes an already-boxed [`Handler`] rather than a generic closure
/// so the trait stays object-safe — the logger and run worker hold this
/// behind `Arc<dyn IpcConnection>`. Build a `Handler` from an ordinary
/// async closure with [`into_handler`].
#[async_trait]
pub trait IpcConnection: Send + Sync {
    /// Enqueue a message for transmission. Returns once accepted for
    /// send, not once acknowledged by the coordinator.
    async fn send(&self, message: WorkerMessage) -> anyhow::Result<()>;

    /// Long-running read loop. Returns on clean EOF / stream close.
    /// Never returns `Err` for malformed input — those are logged and
    /// skipped; only unrecoverable transport failures surface as `Err`.
    async fn start_listening(&self) -> anyhow::Result<()>;

    /// Install a handler for `message_type`. Second registration for the
    /// same type replaces the first.
    fn on(&self, message_type: &str, handler: Handler);

    /// Block until the outbound side is drained, up to `timeout`.
    async fn flush(&self, timeout: Duration) -> anyhow::Result<()>;

    /// Idempotent: mark the connection stopped so `start_listening`
    /// returns at its next opportunity.
    fn stop(&self);

    async fn send_completed(&self, id: &str, output: Option<String>, duration_ms: i64) -> anyhow::Result<()> {
        let mut result = TaskRunSuccessfulExecutionResult::new(id, output);
        result.usage = Some(TaskRunExecutionUsage { duration_ms });
        self.send(WorkerMessage::task_run_completed(result)).await
    }

    async fn send_failed(
        &self,
        id: &str,
        error: trigger_wire::TaskRunError,
        duration_ms: i64,
    ) -> anyhow::Result<()> {
        let mut result = TaskRunFailedExecutionResult::new(id, error);
        result.usage = Some(TaskRunExecutionUsage { duration_ms });
        self.send(WorkerMessage::task_run_failed(result)).await
    }

    async fn send_heartbeat(&self, id: &str) -> anyhow::Result<()> {
        self.send(WorkerMessage::heartbeat(id)).await
    }
}

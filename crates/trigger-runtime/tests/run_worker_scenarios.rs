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

//! End-to-end `RunWorker` scenarios against a recording `IpcConnection`
//! built from this crate's own public `ipc` surface — the same contract a
//! real transport implements, but with `start_listening` driven from a
//! queue instead of a socket or stdin.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use serial_test::serial;

use trigger_runtime::ipc::dispatch::HandlerRegistry;
use trigger_runtime::ipc::{Handler, IpcConnection};
use trigger_runtime::registry::{self, TaskHandler};
use trigger_runtime::run_worker::RunWorker;
use trigger_wire::{
    AttemptInfo, CoordinatorMessage, RunInfo, TaskInfo, TaskRunError, TaskRunErrorCode,
    TaskRunExecution, WorkerMessage,
};

/// Drives `RunWorker::run` the way a real transport would: queued
/// inbound messages are dispatched to whatever handlers `on()` installed,
/// one at a time, in order. Outbound messages are recorded for
/// inspection instead of going anywhere.
struct MockConnection {
    sent: Mutex<Vec<WorkerMessage>>,
    inbound: Mutex<VecDeque<CoordinatorMessage>>,
    handlers: HandlerRegistry,
    stopped: AtomicBool,
}

impl MockConnection {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
            handlers: HandlerRegistry::new(),
            stopped: AtomicBool::new(false),
        })
    }

    fn queue(&self, message: CoordinatorMessage) {
        self.inbound.lock().push_back(message);
    }

    fn sent(&self) -> Vec<WorkerMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl IpcConnection for MockConnection {
    async fn send(&self, message: WorkerMessage) -> anyhow::Result<()> {
        self.sent.lock().push(message);
        Ok(())
    }

    async fn start_listening(&self) -> anyhow::Result<()> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
            let next = self.inbound.lock().pop_front();
            match next {
                Some(message) => self.handlers.dispatch(message).await,
                None => return Ok(()),
            }
        }
    }

    fn on(&self, message_type: &str, handler: Handler) {
        self.handlers.on_handler(message_type, handler);
    }

    async fn flush(&self, _timeout: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn sample_execution(task_id: &str, payload: &str) -> TaskRunExecution {
    TaskRunExecution {
        task: TaskInfo {
            id: task_id.to_string(),
            file_path: "/t.rs".to_string(),
        },
        run: RunInfo {
            id: "run_1".to_string(),
            payload: payload.to_string(),
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
    }
}

fn execute_message(task_id: &str, payload: &str) -> CoordinatorMessage {
    CoordinatorMessage::ExecuteTaskRun {
        version: "v1".to_string(),
        execution: sample_execution(task_id, payload),
    }
}

struct GreetingTask;

#[async_trait]
impl TaskHandler for GreetingTask {
    async fn execute(&self, payload: Value) -> anyhow::Result<Value> {
        let name = payload["name"].as_str().unwrap_or_default();
        Ok(json!({ "greeting": format!("Hello {name}") }))
    }
    fn id(&self) -> &str {
        "hello"
    }
}

struct SleepForeverTask;

#[async_trait]
impl TaskHandler for SleepForeverTask {
    async fn execute(&self, _payload: Value) -> anyhow::Result<Value> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(json!({}))
    }
    fn id(&self) -> &str {
        "sleeper"
    }
}

#[tokio::test]
#[serial]
async fn happy_run_completes_with_the_expected_greeting() {
    registry::clear();
    registry::try_register_task_constructor("hello", "/t.py".to_string(), None, None, None, None, || {
        Arc::new(GreetingTask)
    })
    .unwrap();

    let connection = MockConnection::new();
    connection.queue(execute_message("hello", r#"{"name":"World"}"#));

    let worker = RunWorker::new(connection.clone());
    worker.run().await.unwrap();

    let sent = connection.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        WorkerMessage::TaskRunCompleted { completion, .. } => {
            assert!(completion.ok);
            assert_eq!(completion.id, "run_1");
            let output: Value = serde_json::from_str(completion.output.as_ref().unwrap()).unwrap();
            assert_eq!(output, json!({"greeting": "Hello World"}));
            let usage = completion.usage.as_ref().expect("usage present");
            assert!(usage.duration_ms >= 0);
        }
        other => panic!("expected TaskRunCompleted, got {other:?}"),
    }

    registry::clear();
}

#[tokio::test]
#[serial]
async fn cancellation_terminates_with_exactly_one_cancelled_result() {
    registry::clear();
    registry::try_register_task_constructor("sleeper", "/t.rs".to_string(), None, None, None, None, || {
        Arc::new(SleepForeverTask)
    })
    .unwrap();

    let connection = MockConnection::new();
    connection.queue(execute_message("sleeper", "{}"));

    let worker = RunWorker::new(connection.clone());

    // Models the SIGTERM/SIGINT path installed around `RunWorker` in the
    // run-worker binary: cancellation arrives from outside the read loop
    // while the task is still executing.
    let cancel_worker = worker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_worker.cancel();
    });

    worker.run().await.unwrap();

    let sent = connection.sent();
    assert_eq!(sent.len(), 1, "exactly one terminal message, got {sent:?}");
    match &sent[0] {
        WorkerMessage::TaskRunFailedToRun { completion, .. } => {
            assert!(!completion.ok);
            match &completion.error {
                TaskRunError::Internal { code, .. } => {
                    assert_eq!(*code, TaskRunErrorCode::TaskRunCancelled)
                }
                other => panic!("expected Internal/TASK_RUN_CANCELLED, got {other:?}"),
            }
        }
        other => panic!("expected TaskRunFailedToRun, got {other:?}"),
    }

    registry::clear();
}

#[tokio::test(start_paused = true)]
#[serial]
async fn heartbeats_are_emitted_before_the_terminal_result() {
    use trigger_runtime::config::HEARTBEAT_INTERVAL;

    struct SlowTask;

    #[async_trait]
    impl TaskHandler for SlowTask {
        async fn execute(&self, _payload: Value) -> anyhow::Result<Value> {
            tokio::time::sleep(HEARTBEAT_INTERVAL * 6).await;
            Ok(json!({}))
        }
        fn id(&self) -> &str {
            "slow"
        }
    }

    registry::clear();
    registry::try_register_task_constructor("slow", "/t.rs".to_string(), None, None, None, None, || {
        Arc::new(SlowTask)
    })
    .unwrap();

    let connection = MockConnection::new();
    connection.queue(execute_message("slow", "{}"));

    let worker = RunWorker::new(connection.clone());
    let run_handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    // Advance the paused clock past three heartbeat intervals while the
    // task is still sleeping, then well past its own sleep so it resolves.
    for _ in 0..3 {
        tokio::time::advance(HEARTBEAT_INTERVAL + Duration::from_millis(1)).await;
    }
    tokio::time::advance(HEARTBEAT_INTERVAL * 10).await;

    run_handle.await.unwrap().unwrap();

    let sent = connection.sent();
    let heartbeat_count = sent
        .iter()
        .filter(|m| matches!(m, WorkerMessage::TaskHeartbeat { .. }))
        .count();
    assert!(heartbeat_count >= 3, "expected at least 3 heartbeats, got {heartbeat_count}");

    let terminal_index = sent
        .iter()
        .position(|m| matches!(m, WorkerMessage::TaskRunCompleted { .. }))
        .expect("a terminal TaskRunCompleted message");
    assert!(
        sent[..terminal_index].iter().all(|m| matches!(m, WorkerMessage::TaskHeartbeat { .. })),
        "every heartbeat must precede the terminal result"
    );

    registry::clear();
}

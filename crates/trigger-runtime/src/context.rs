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

//! Per-run ambient context.
//!
//! Carried in a `tokio::task_local!` cell (not a thread-local) so it
//! survives the task being polled across await points, the same pattern
//! `cloacina`'s executor uses for its `TaskHandle` slot.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

use trigger_wire::{AttemptInfo, BatchInfo, RunInfo, TaskInfo, TaskRunExecution};

#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: TaskInfo,
    pub run: RunInfo,
    pub attempt: AttemptInfo,
    pub batch: Option<BatchInfo>,
    pub environment: HashMap<String, String>,
}

impl TaskContext {
    pub fn from_execution(execution: &TaskRunExecution) -> Self {
        let mut environment = HashMap::new();
        if let Some(env) = &execution.environment {
            environment.insert("id".to_string(), env.id.clone());
            environment.insert("slug".to_string(), env.slug.clone());
            environment.insert("type".to_string(), format!("{:?}", env.kind));
        }

        Self {
            task: execution.task.clone(),
            run: execution.run.clone(),
            attempt: execution.attempt.clone(),
            batch: execution.batch.clone(),
            environment,
        }
    }

    /// `true` once this run is beyond its first attempt.
    pub fn is_retry(&self) -> bool {
        self.attempt.number > 1
    }
}

tokio::task_local! {
    static CURRENT_CONTEXT: RefCell<Option<TaskContext>>;
}

/// Run `fut` with `ctx` installed as the current ambient context. The
/// context is cleared automatically when the scope ends.
pub async fn scope<F: Future>(ctx: TaskContext, fut: F) -> F::Output {
    CURRENT_CONTEXT.scope(RefCell::new(Some(ctx)), fut).await
}

/// The current context, or `None` outside of a run's scope.
pub fn get_current() -> Option<TaskContext> {
    CURRENT_CONTEXT
        .try_with(|cell| cell.borrow().clone())
        .unwrap_or(None)
}

/// Clear the current context without ending the scope. Mirrors the
/// reference SDK's explicit `clear_current_context()`, used defensively
/// by the run worker's `finally` block even though `scope` already clears
/// on exit.
pub fn clear_current() {
    let _ = CURRENT_CONTEXT.try_with(|cell| {
        *cell.borrow_mut() = None;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use trigger_wire::{AttemptInfo, RunInfo, TaskInfo};

    fn sample_context(attempt_number: u32) -> TaskContext {
        TaskContext {
            task: TaskInfo {
                id: "hello".to_string(),
                file_path: "/t.rs".to_string(),
            },
            run: RunInfo {
                id: "run_1".to_string(),
                payload: "{}".to_string(),
                payload_type: "application/json".to_string(),
                tags: vec![],
                is_test: false,
            },
            attempt: AttemptInfo {
                id: "a1".to_string(),
                number: attempt_number,
                started_at: "2024-01-01T00:00:00Z".to_string(),
            },
            batch: None,
            environment: HashMap::new(),
        }
    }

    #[test]
    fn get_current_is_none_outside_scope() {
        assert!(get_current().is_none());
    }

    #[tokio::test]
    async fn scope_installs_and_clears_context() {
        let ctx = sample_context(1);
        scope(ctx, async {
            let current = get_current().expect("context installed");
            assert_eq!(current.run.id, "run_1");
        })
        .await;

        assert!(get_current().is_none());
    }

    #[tokio::test]
    async fn context_survives_an_await_point() {
        let ctx = sample_context(2);
        scope(ctx, async {
            tokio::task::yield_now().await;
            let current = get_current().expect("context still installed after await");
            assert!(current.is_retry());
        })
        .await;
    }

    #[test]
    fn is_retry_true_only_past_first_attempt() {
        assert!(!sample_context(1).is_retry());
        assert!(sample_context(2).is_retry());
    }
}

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

//! Process-wide task registry.
//!
//! Populated once, at import time, by `ctor`-registered constructors
//! emitted from the `#[task(...)]` macro. Mutated only before any task
//! runs; read-only for the rest of the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use trigger_wire::{QueueConfig, RetryConfig, TaskResource};

/// A registered task's executable body.
///
/// Implementations are generated by `#[task(...)]`; `execute` dispatches
/// synchronous bodies to the blocking pool and awaits asynchronous ones
/// directly (decided at macro-expansion time, not here).
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, payload: Value) -> anyhow::Result<Value>;
    fn id(&self) -> &str;
}

type Constructor = Box<dyn Fn() -> Arc<dyn TaskHandler> + Send + Sync>;

/// Static metadata recorded at registration time, independent of the
/// constructed handler instance.
pub struct RegisteredTask {
    pub id: String,
    pub file_path: String,
    pub retry: Option<RetryConfig>,
    pub queue: Option<QueueConfig>,
    pub max_duration: Option<u64>,
    pub description: Option<String>,
    constructor: Constructor,
}

impl RegisteredTask {
    /// Build a handler instance. Cheap — constructors are zero-sized unit
    /// structs in the common case.
    pub fn handler(&self) -> Arc<dyn TaskHandler> {
        (self.constructor)()
    }

    pub fn to_resource(&self) -> TaskResource {
        TaskResource {
            id: self.id.clone(),
            file_path: self.file_path.clone(),
            export_name: self.id.clone(),
            entry_point: self.file_path.clone(),
            description: self.description.clone(),
            queue: self.queue.clone(),
            retry: self.retry.clone(),
            max_duration: self.max_duration,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("task with id `{0}` already registered")]
    DuplicateTaskId(String),
    #[error("task id must not be empty")]
    InvalidTaskShape,
}

static REGISTRY: Lazy<RwLock<HashMap<String, RegisteredTask>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Insert a task constructor into the global registry.
///
/// Called from the `ctor`-annotated block the `#[task(...)]` macro
/// generates. Panics on a duplicate `id` — at registration time (process
/// startup, before `main`) there is no sensible recovery path, matching
/// the reference SDK's `ValueError` on re-registration.
#[allow(clippy::too_many_arguments)]
pub fn register_task_constructor(
    id: &str,
    file_path: String,
    retry: Option<RetryConfig>,
    queue: Option<QueueConfig>,
    max_duration: Option<u64>,
    description: Option<String>,
    constructor: impl Fn() -> Arc<dyn TaskHandler> + Send + Sync + 'static,
) {
    if id.is_empty() {
        panic!("{}", RegistryError::InvalidTaskShape);
    }
    let mut guard = REGISTRY.write();
    if guard.contains_key(id) {
        panic!("{}", RegistryError::DuplicateTaskId(id.to_string()));
    }
    guard.insert(
        id.to_string(),
        RegisteredTask {
            id: id.to_string(),
            file_path,
            retry,
            queue,
            max_duration,
            description,
            constructor: Box::new(constructor),
        },
    );
}

/// Try to register without panicking — used by tests that exercise the
/// `DuplicateTaskId` path directly.
#[allow(clippy::too_many_arguments)]
pub fn try_register_task_constructor(
    id: &str,
    file_path: String,
    retry: Option<RetryConfig>,
    queue: Option<QueueConfig>,
    max_duration: Option<u64>,
    description: Option<String>,
    constructor: impl Fn() -> Arc<dyn TaskHandler> + Send + Sync + 'static,
) -> Result<(), RegistryError> {
    if id.is_empty() {
        return Err(RegistryError::InvalidTaskShape);
    }
    let mut guard = REGISTRY.write();
    if guard.contains_key(id) {
        return Err(RegistryError::DuplicateTaskId(id.to_string()));
    }
    guard.insert(
        id.to_string(),
        RegisteredTask {
            id: id.to_string(),
            file_path,
            retry,
            queue,
            max_duration,
            description,
            constructor: Box::new(constructor),
        },
    );
    Ok(())
}

/// Look up a task's handler by id.
pub fn get_task(id: &str) -> Option<Arc<dyn TaskHandler>> {
    REGISTRY.read().get(id).map(|t| t.handler())
}

pub fn is_registered(id: &str) -> bool {
    REGISTRY.read().contains_key(id)
}

/// Snapshot of every registered task's metadata, for the indexer.
pub fn list_resources() -> Vec<TaskResource> {
    REGISTRY.read().values().map(|t| t.to_resource()).collect()
}

pub fn len() -> usize {
    REGISTRY.read().len()
}

/// Clear the registry. Test-only: registry mutation is otherwise a
/// single-shot, process-startup event. Left visible outside `cfg(test)`
/// so integration tests in `tests/` — which link this crate as an
/// ordinary dependency, not under `cfg(test)` — can reset state between
/// scenarios.
pub fn clear() {
    REGISTRY.write().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EchoTask;

    #[async_trait]
    impl TaskHandler for EchoTask {
        async fn execute(&self, payload: Value) -> anyhow::Result<Value> {
            Ok(payload)
        }
        fn id(&self) -> &str {
            "echo"
        }
    }

    #[test]
    #[serial]
    fn registers_and_looks_up_by_id() {
        clear();
        try_register_task_constructor(
            "echo",
            "/t.rs".to_string(),
            None,
            None,
            None,
            None,
            || Arc::new(EchoTask),
        )
        .unwrap();

        assert!(is_registered("echo"));
        assert!(get_task("missing").is_none());
        assert_eq!(len(), 1);
        clear();
    }

    #[test]
    #[serial]
    fn second_registration_of_same_id_fails_and_first_is_retained() {
        clear();
        try_register_task_constructor(
            "dup",
            "/a.rs".to_string(),
            None,
            None,
            None,
            None,
            || Arc::new(EchoTask),
        )
        .unwrap();

        let result = try_register_task_constructor(
            "dup",
            "/b.rs".to_string(),
            None,
            None,
            None,
            None,
            || Arc::new(EchoTask),
        );

        assert!(matches!(result, Err(RegistryError::DuplicateTaskId(_))));
        assert!(is_registered("dup"));
        clear();
    }

    #[tokio::test]
    #[serial]
    async fn handler_executes_and_echoes_payload() {
        clear();
        try_register_task_constructor(
            "echo2",
            "/t.rs".to_string(),
            None,
            None,
            None,
            None,
            || Arc::new(EchoTask),
        )
        .unwrap();

        let handler = get_task("echo2").unwrap();
        let out = handler.execute(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(out, serde_json::json!({"x": 1}));
        clear();
    }

    #[test]
    #[serial]
    fn to_resource_mirrors_id_as_export_name_and_entry_point() {
        clear();
        try_register_task_constructor(
            "hello",
            "/hello.rs".to_string(),
            None,
            None,
            None,
            Some("greets".to_string()),
            || Arc::new(EchoTask),
        )
        .unwrap();

        let resources = list_resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].export_name, "hello");
        assert_eq!(resources[0].entry_point, "/hello.rs");
        assert_eq!(resources[0].description.as_deref(), Some("greets"));
        clear();
    }
}

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

//! Test-only fixture: a `run-worker` with one task, `hello`, registered
//! ahead of time. `run-worker` itself never bundles a task — those come
//! from whatever the coordinator's build step links in — so the
//! stdio happy-run scenario needs a real binary with a known task to
//! drive end-to-end. Not installed by anything; exists for
//! `tests/happy_run_stdio.rs` to spawn.

use std::process::ExitCode;
use std::sync::Arc;

use serde_json::{json, Value};
use trigger_macros::task;
use trigger_runtime::ipc::stdio::StdioTransport;
use trigger_runtime::ipc::IpcConnection;
use trigger_runtime::logger;
use trigger_runtime::run_worker::RunWorker;

#[task(id = "hello")]
fn hello(payload: Value) -> anyhow::Result<Value> {
    let name = payload["name"].as_str().unwrap_or_default();
    Ok(json!({ "greeting": format!("Hello {name}") }))
}

#[tokio::main]
async fn main() -> ExitCode {
    let connection: Arc<dyn IpcConnection> = StdioTransport::new();
    logger::install(connection.clone());

    let worker = RunWorker::new(connection);
    let result = worker.run().await;

    logger::uninstall();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

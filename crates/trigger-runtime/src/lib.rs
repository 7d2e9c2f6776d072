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

//! Worker-side runtime: registry, context, error classification, logging,
//! IPC transports, the indexer, and the run-worker state machine.

pub mod config;
pub mod context;
pub mod error_mapper;
pub mod indexer;
pub mod ipc;
pub mod logger;
pub mod registry;
pub mod run_worker;

/// Re-exported so `#[task(...)]`-expanded code can reference
/// `trigger_runtime::async_trait`/`trigger_runtime::ctor` without the
/// downstream crate declaring its own dependency on either.
pub use async_trait;
pub use ctor;

pub mod proto {
    tonic::include_proto!("worker.v1");
}

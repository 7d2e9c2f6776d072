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

//! Startup configuration, shared by the `index-worker` and `run-worker`
//! binaries. Values come from the environment (and an optional `.env`
//! file); the indexer and the run worker each add their own `clap`
//! subcommand-level flags on top of this.

use std::time::Duration;

use clap::Args;

/// Best-effort heartbeat cadence (spec.md §4.10). Fixed rather than
/// configurable — changing it is a protocol change, not a deployment
/// knob.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Args)]
pub struct WorkerConfig {
    /// Path to the build manifest listing task source files to index.
    #[arg(long, env = "TRIGGER_BUILD_MANIFEST_PATH", default_value = "./build-manifest.json")]
    pub build_manifest_path: String,

    /// Coordinator gRPC endpoint. Absence means the stdio transport is
    /// used instead; presence is a hard requirement to use RPC — there is
    /// no fallback if the dial fails.
    #[arg(long, env = "TRIGGER_GRPC_ADDRESS")]
    pub grpc_address: Option<String>,

    /// Passed through to outbound spans only; never parsed or validated.
    #[arg(long, env = "TRACEPARENT")]
    pub traceparent: Option<String>,
}

impl WorkerConfig {
    pub fn uses_rpc(&self) -> bool {
        self.grpc_address.is_some()
    }
}

/// Load a `.env` file if present. Missing-file is not an error; a
/// malformed one is, since it signals a broken deployment rather than a
/// bare-environment one.
pub fn load_dotenv() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

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

//! Indexer entry point: loads the build manifest, verifies every listed
//! task source file, and emits one `INDEX_COMPLETE` (stdio) or
//! `INDEX_TASKS_COMPLETE` (RPC) message before exiting.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trigger_runtime::config::WorkerConfig;
use trigger_runtime::ipc::rpc::RpcTransport;
use trigger_runtime::ipc::stdio::StdioTransport;
use trigger_runtime::ipc::IpcConnection;
use trigger_runtime::{indexer, registry};
use trigger_wire::WorkerMessage;

#[derive(Parser)]
#[command(name = "index-worker")]
#[command(about = "Discovers tasks linked into this binary and reports them to the coordinator")]
struct Cli {
    #[command(flatten)]
    config: WorkerConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = trigger_runtime::config::load_dotenv() {
        tracing::warn!(error = %err, "failed to load .env file");
    }

    let cli = Cli::parse();

    match run(cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "indexer failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let manifest_path = PathBuf::from(&config.build_manifest_path);
    let payload = indexer::build_index(&manifest_path)?;

    tracing::info!(
        tasks = registry::len(),
        import_errors = payload.import_errors.len(),
        "index built"
    );

    // Stdio emits the one-shot `INDEX_COMPLETE` payload; RPC emits the
    // streaming `INDEX_TASKS_COMPLETE` shape instead (spec.md §4.1) — the
    // two are alternatives, not both sent on the same transport.
    let (connection, message): (Arc<dyn IpcConnection>, WorkerMessage) =
        if let Some(address) = config.grpc_address {
            let tasks = payload.manifest.tasks.clone();
            let connection = RpcTransport::connect(address).await?;
            (
                connection,
                WorkerMessage::IndexTasksComplete {
                    version: trigger_wire::WIRE_VERSION.to_string(),
                    tasks,
                },
            )
        } else {
            (StdioTransport::new(), WorkerMessage::index_complete(payload))
        };

    connection.send(message).await?;
    connection.flush(std::time::Duration::from_secs(5)).await?;
    connection.stop();

    Ok(())
}

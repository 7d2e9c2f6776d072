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

//! Run-worker entry point: opens the IPC channel, drives exactly one
//! task attempt through its state machine, and exits.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trigger_runtime::config::WorkerConfig;
use trigger_runtime::ipc::rpc::RpcTransport;
use trigger_runtime::ipc::stdio::StdioTransport;
use trigger_runtime::ipc::IpcConnection;
use trigger_runtime::run_worker::RunWorker;
use trigger_runtime::logger;

#[derive(Parser)]
#[command(name = "run-worker")]
#[command(about = "Executes a single task attempt to completion, then exits")]
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
            tracing::error!(error = %err, "run worker exited with an unrecoverable IPC failure");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let connection: Arc<dyn IpcConnection> = match config.grpc_address {
        Some(address) => RpcTransport::connect(address).await?,
        None => StdioTransport::new(),
    };

    logger::install(connection.clone());

    let worker = RunWorker::new(connection);
    install_signal_handlers(&worker);

    let result = worker.run().await;

    logger::uninstall();
    result
}

/// Termination signals converge with a `CANCEL` wire message onto the
/// same cooperative-cancellation path (spec.md §4.10 step 1).
fn install_signal_handlers(worker: &Arc<RunWorker>) {
    let worker = worker.clone();
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
        tracing::info!("termination signal received, cancelling current run");
        worker.cancel();
    });
}

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

//! Line-delimited JSON over stdin/stdout.
//!
//! Every outbound frame is one JSON object followed by `\n`, written
//! through a mutex so concurrent callers (the logger and the run worker
//! can both be sending at once) never interleave partial lines. Inbound
//! frames are read one line at a time from stdin; diagnostics about the
//! transport itself go to stderr exclusively, never stdout, since stdout
//! is the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use trigger_wire::{CoordinatorMessage, WorkerMessage};

use super::dispatch::HandlerRegistry;
use super::{Handler, IpcConnection};

/// Outbound side is generic over the writer so the mutex-guarded framing
/// in [`Self::write_line`] — the thing that makes concurrent `send`s
/// produce whole, non-interleaved lines — can be exercised against an
/// in-memory pipe instead of the process's real stdout. Production code
/// only ever sees `StdioTransport<tokio::io::Stdout>`, built by `new()`.
pub struct StdioTransport<W: AsyncWrite + Unpin + Send = tokio::io::Stdout> {
    stdout: Mutex<W>,
    handlers: HandlerRegistry,
    stopped: AtomicBool,
}

impl StdioTransport<tokio::io::Stdout> {
    pub fn new() -> Arc<Self> {
        Self::with_writer(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> StdioTransport<W> {
    /// Build a transport over an arbitrary async writer. Used by
    /// `new()` and by tests that need to inspect the raw framed output.
    pub fn with_writer(writer: W) -> Arc<Self> {
        Arc::new(Self {
            stdout: Mutex::new(writer),
            handlers: HandlerRegistry::new(),
            stopped: AtomicBool::new(false),
        })
    }

    async fn write_line(&self, line: &str) -> anyhow::Result<()> {
        let mut out = self.stdout.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> IpcConnection for StdioTransport<W> {
    async fn send(&self, message: WorkerMessage) -> anyhow::Result<()> {
        let line = serde_json::to_string(&message)?;
        self.write_line(&line).await
    }

    async fn start_listening(&self) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        while !self.stopped.load(Ordering::SeqCst) {
            let line = match lines.next_line().await? {
                Some(line) => line,
                None => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CoordinatorMessage>(&line) {
                Ok(message) => self.handlers.dispatch(message).await,
                Err(err) => {
                    tracing::warn!(error = %err, line, "failed to decode coordinator message");
                }
            }
        }
        Ok(())
    }

    fn on(&self, message_type: &str, handler: Handler) {
        self.handlers.on_handler(message_type, handler);
    }

    async fn flush(&self, _timeout: Duration) -> anyhow::Result<()> {
        let mut out = self.stdout.lock().await;
        out.flush().await?;
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

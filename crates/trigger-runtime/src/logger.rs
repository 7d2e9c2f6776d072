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

//! Wire-protocol log emission.
//!
//! Deliberately separate from this crate's own `tracing` instrumentation
//! (used for the runtime's operational logs). This `Logger` speaks the
//! `LOG` wire message the coordinator ingests as part of a run's output,
//! and falls back to a JSON line on stderr whenever no IPC channel is
//! installed or the send itself fails.

use std::sync::Arc;
use std::sync::OnceLock;

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;

use trigger_wire::{LogLevel, LogTaskMetadata, WorkerMessage};

use crate::context;
use crate::ipc::IpcConnection;

static SINK: OnceLock<RwLock<Option<Arc<dyn IpcConnection>>>> = OnceLock::new();

fn sink() -> &'static RwLock<Option<Arc<dyn IpcConnection>>> {
    SINK.get_or_init(|| RwLock::new(None))
}

/// Install the active IPC connection as the logger's sink. Called once
/// the run worker has a connection up; before that, every log call falls
/// back to stderr.
pub fn install(connection: Arc<dyn IpcConnection>) {
    *sink().write() = Some(connection);
}

/// Remove the installed sink, forcing subsequent logs back to stderr.
/// Used when the connection is torn down (spec.md §4.10's EXIT state).
pub fn uninstall() {
    *sink().write() = None;
}

#[derive(Clone, Copy, Debug)]
pub struct Logger {
    name: &'static str,
}

impl Logger {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(LogLevel::Debug, message.into(), None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into(), None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(LogLevel::Warn, message.into(), None);
    }

    pub fn error(&self, message: impl Into<String>, exception: Option<String>) {
        self.emit(LogLevel::Error, message.into(), exception);
    }

    /// Escape hatch for a caller-chosen level outside the four standard
    /// severities (spec.md §4.5).
    pub fn log(&self, level: impl Into<LogLevel>, message: impl Into<String>) {
        self.emit(level.into(), message.into(), None);
    }

    fn emit(&self, level: LogLevel, message: String, exception: Option<String>) {
        let task = context::get_current().map(|ctx| LogTaskMetadata {
            id: ctx.task.id,
            run_id: ctx.run.id,
            attempt_id: ctx.attempt.id,
            attempt_number: ctx.attempt.number,
        });

        let wire_message = WorkerMessage::Log {
            version: trigger_wire::WIRE_VERSION.to_string(),
            level,
            message,
            logger: self.name.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            exception,
            task,
        };

        let connection = sink().read().clone();
        match connection {
            Some(connection) => {
                // Best-effort: dropping the future's result here is
                // deliberate. Synchronous callers (task bodies running on
                // the blocking pool) cannot await a send, and a log that
                // never reaches the coordinator must never fail the run.
                tokio::spawn(async move {
                    if let Err(err) = connection.send(wire_message.clone()).await {
                        write_stderr_fallback(&wire_message, &err.to_string());
                    }
                });
            }
            None => write_stderr_fallback(&wire_message, "no ipc sink installed"),
        }
    }
}

fn write_stderr_fallback(message: &WorkerMessage, reason: &str) {
    match serde_json::to_string(message) {
        Ok(line) => eprintln!("{line}"),
        Err(_) => eprintln!("{{\"level\":\"ERROR\",\"message\":\"failed to serialize log line: {reason}\"}}"),
    }
}

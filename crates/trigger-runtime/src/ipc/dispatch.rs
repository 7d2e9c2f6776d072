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

//! Handler registry shared by both transports.
//!
//! Dispatch is serialized by construction: `start_listening` loops call
//! `dispatch` and await it before reading the next frame, so at most one
//! handler runs at a time per connection (spec.md §4.6, §5).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use trigger_wire::CoordinatorMessage;

type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A boxed, type-erased handler. Kept non-generic (as opposed to a bare
/// closure type) so `IpcConnection::on` stays object-safe — the trait is
/// held behind `Arc<dyn IpcConnection>` by the logger and the run worker.
pub type Handler = Arc<dyn Fn(CoordinatorMessage) -> BoxFuture<'static> + Send + Sync>;

/// Box an ordinary async closure into a [`Handler`].
pub fn into_handler<F, Fut>(handler: F) -> Handler
where
    F: Fn(CoordinatorMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(handler(msg)))
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler for `message_type`. A second registration for the
    /// same type replaces the first, matching the reference SDK's `on()`.
    pub fn on<F, Fut>(&self, message_type: &str, handler: F)
    where
        F: Fn(CoordinatorMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_handler(message_type, into_handler(handler));
    }

    /// Install an already-boxed handler. What the `IpcConnection` trait
    /// methods delegate to, since the trait itself can't take a generic
    /// closure and stay object-safe.
    pub fn on_handler(&self, message_type: &str, handler: Handler) {
        self.handlers.write().insert(message_type.to_string(), handler);
    }

    /// Dispatch one message to its registered handler, if any. Never
    /// panics on a missing handler — logs and returns.
    pub async fn dispatch(&self, message: CoordinatorMessage) {
        let handler = self.handlers.read().get(message.type_tag()).cloned();
        match handler {
            Some(handler) => handler(message).await,
            None => warn!(type_tag = message.type_tag(), "no handler registered for message type"),
        }
    }
}

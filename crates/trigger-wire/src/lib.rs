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

//! Wire schema for worker↔coordinator IPC.
//!
//! Every message is a self-describing JSON object carrying a `type` tag and
//! a `version` string fixed at `"v1"`. Unknown required fields fail to
//! decode; unknown optional fields are accepted and ignored by `serde`'s
//! default behavior.

pub mod common;
pub mod errors;
pub mod messages;
pub mod resources;

pub use common::*;
pub use errors::*;
pub use messages::*;
pub use resources::*;

/// Current wire protocol version. Every message carries this literal.
pub const WIRE_VERSION: &str = "v1";

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

//! Task metadata reported to the coordinator during indexing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        rename = "concurrencyLimit",
        skip_serializing_if = "Option::is_none"
    )]
    pub concurrency_limit: Option<u32>,
}

/// Retry configuration. Defaults match spec.md §3 when a field is omitted
/// at the `#[task(...)]` call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(rename = "minTimeoutInMs")]
    pub min_timeout_in_ms: u64,
    #[serde(rename = "maxTimeoutInMs")]
    pub max_timeout_in_ms: u64,
    pub factor: f64,
    pub randomize: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_timeout_in_ms: 1000,
            max_timeout_in_ms: 60_000,
            factor: 2.0,
            randomize: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResource {
    pub id: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "exportName")]
    pub export_name: String,
    /// Duplicate of `filePath`, required by the coordinator's schema for
    /// backwards compatibility with earlier indexer versions.
    #[serde(rename = "entryPoint")]
    pub entry_point: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(
        default,
        rename = "maxDuration",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_duration: Option<u64>,
}

impl TaskResource {
    pub fn new(id: impl Into<String>, file_path: impl Into<String>) -> Self {
        let id = id.into();
        let file_path = file_path.into();
        Self {
            export_name: id.clone(),
            entry_point: file_path.clone(),
            id,
            file_path,
            description: None,
            queue: None,
            retry: None,
            max_duration: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_defaults_match_spec() {
        let c = RetryConfig::default();
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.min_timeout_in_ms, 1000);
        assert_eq!(c.max_timeout_in_ms, 60_000);
        assert_eq!(c.factor, 2.0);
        assert!(c.randomize);
    }

    #[test]
    fn task_resource_export_name_mirrors_id() {
        let t = TaskResource::new("hello", "/t.py");
        assert_eq!(t.export_name, "hello");
        assert_eq!(t.entry_point, "/t.py");
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Settings shared by transform configurations.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{Error, Result};

/// A transform as it appears in a pipeline file: `{"type": "...", "settings": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TransformConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl TransformConfig {
    pub fn new(kind: &str, settings: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            settings,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub transforms: Vec<TransformConfig>,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::config(format!("parsing {}: {e}", path.display())))
    }
}

/// Limits for one aggregator. Zero (or no duration) means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Batch {
    pub count: usize,
    pub size: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Option<Duration>,
}

impl Batch {
    /// Caps count and size at an API's per-call maxima. Unset values take the maxima.
    pub fn clamped(&self, max_count: usize, max_size: usize) -> Self {
        let clamp = |value: usize, max: usize| {
            if value == 0 || value > max {
                max
            } else {
                value
            }
        };

        Self {
            count: clamp(self.count, max_count),
            size: clamp(self.size, max_size),
            duration: self.duration,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Object {
    #[serde(alias = "key")]
    pub source_key: String,
    #[serde(alias = "set_key")]
    pub target_key: String,
    pub batch_key: String,
}

/// How a transform reads and writes record contents, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Operate on the whole payload.
    Payload,
    /// Read from `source_key`, write to `target_key`.
    Object {
        source_key: String,
        target_key: String,
    },
}

impl Object {
    pub fn mode(&self) -> Result<Mode> {
        match (self.source_key.is_empty(), self.target_key.is_empty()) {
            (true, true) => Ok(Mode::Payload),
            (false, false) => Ok(Mode::Object {
                source_key: self.source_key.clone(),
                target_key: self.target_key.clone(),
            }),
            _ => Err(Error::config(
                "object.source_key and object.target_key must be set together",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Aws {
    pub arn: String,
    pub region: Option<String>,
}

impl Aws {
    /// Region from `arn:partition:service:region:account:resource`.
    pub fn region(&self) -> Option<String> {
        if let Some(region) = &self.region {
            return Some(region.clone());
        }
        self.arn
            .split(':')
            .nth(3)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
    }
}

const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Bounds resubmission of records rejected by a partially failed batch call.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Retry {
    /// Total batch calls allowed for one flush, including the first.
    pub max_attempts: u32,
    /// Linear backoff between resubmissions.
    #[serde(with = "humantime_serde")]
    pub backoff: Option<Duration>,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: None,
        }
    }
}

/// Decodes transform settings; a missing settings block decodes as defaults.
pub fn decode<T: DeserializeOwned + Default>(settings: &serde_json::Value) -> Result<T> {
    if settings.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(settings.clone()).map_err(|e| Error::config(e.to_string()))
}

/// Canonical JSON of a settings struct, used as a transform's fingerprint.
pub fn fingerprint<T: Serialize>(conf: &T) -> String {
    serde_json::to_string(conf).unwrap_or_default()
}

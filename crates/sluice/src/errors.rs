// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by transform construction and by `transform`/`apply` calls.
///
/// None of these are retried by the pipeline; the chain aborts on the first one.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid settings, detected while building a transform.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A single record is larger than the sink accepts.
    #[error("transform {id}: data exceeded size limit ({size} > {limit} bytes)")]
    SizeLimit {
        id: String,
        size: usize,
        limit: usize,
    },

    /// An item did not fit into a freshly emptied buffer.
    #[error("transform {id}: batch misconfigured, {size} byte item does not fit an empty buffer")]
    BatchMisconfigured { id: String, size: usize },

    /// The batch call itself failed.
    #[error("transform {id}: {source}")]
    Dispatch {
        id: String,
        #[source]
        source: DispatchError,
    },

    /// Record contents could not be processed (bad JSON, unsettable path).
    #[error("transform {id}: {reason}")]
    Transform { id: String, reason: String },

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transform(id: &str, reason: impl Into<String>) -> Self {
        Self::Transform {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures of the external batch call.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Provider(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{remaining} records still rejected after {attempts} attempts")]
    RetriesExhausted { remaining: usize, attempts: u32 },

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("cannot set {path}: document is not a JSON object or array")]
    NotJson { path: String },

    #[error("cannot set {path}: empty path")]
    EmptyPath { path: String },
}

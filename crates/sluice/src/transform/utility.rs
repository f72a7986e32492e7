// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline control stages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::aggregate::Aggregator;
use crate::config::{decode, fingerprint, Batch};
use crate::errors::{Error, Result};
use crate::message::Message;
use crate::transform::{Context, Transformer};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DropConfig {
    pub id: String,
}

/// Discards data records. Control records pass.
pub struct UtilityDrop {
    conf: DropConfig,
}

impl UtilityDrop {
    pub fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: DropConfig = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "utility_drop".to_string();
        }
        Ok(Self { conf })
    }
}

#[async_trait]
impl Transformer for UtilityDrop {
    async fn transform(&self, _ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        if msg.is_control() {
            return Ok(vec![msg]);
        }
        Ok(vec![])
    }
}

impl fmt::Display for UtilityDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    pub id: String,
    pub batch: Batch,
}

/// Inserts a control record whenever the records seen since the last one
/// would break `batch`, so downstream stages flush mid-stream.
///
/// The control record is emitted ahead of the record that overflowed, which
/// then starts the next window.
pub struct UtilityControl {
    conf: ControlConfig,
    agg: Mutex<Aggregator>,
}

impl UtilityControl {
    pub fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: ControlConfig = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "utility_control".to_string();
        }

        Ok(Self {
            agg: Mutex::new(Aggregator::new(&conf.batch)),
            conf,
        })
    }
}

#[async_trait]
impl Transformer for UtilityControl {
    async fn transform(&self, _ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        let mut agg = self.agg.lock().await;

        if msg.is_control() {
            agg.reset_all();
            return Ok(vec![msg]);
        }

        if agg.add("", msg.data()) {
            return Ok(vec![msg]);
        }

        debug!("{}: window full after {} records", self.conf.id, agg.count(""));
        agg.reset("");
        if !agg.add("", msg.data()) {
            return Err(Error::BatchMisconfigured {
                id: self.conf.id.clone(),
                size: msg.data().len(),
            });
        }

        Ok(vec![Message::control(), msg])
    }
}

impl fmt::Display for UtilityControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::aggregate::Aggregator;
use crate::config::{decode, fingerprint, Batch, Mode, Object};
use crate::errors::{Error, Result};
use crate::message::Message;
use crate::transform::{Context, Transformer};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    pub object: Object,
    pub batch: Batch,
    /// Placed between items. Required.
    pub separator: String,
}

/// Joins record payloads with a separator, one output per group.
///
/// In object mode the joined items are the values at `source_key`, and the
/// result is written as a string at `target_key` of a fresh record.
pub struct AggregateToString {
    conf: Config,
    mode: Mode,
    agg: Mutex<Aggregator>,
}

impl AggregateToString {
    pub fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "aggregate_to_string".to_string();
        }
        if conf.separator.is_empty() {
            return Err(Error::config("separator: missing required option"));
        }
        let mode = conf.object.mode()?;

        Ok(Self {
            agg: Mutex::new(Aggregator::new(&conf.batch)),
            mode,
            conf,
        })
    }

    fn join(&self, items: &[Vec<u8>]) -> Result<Message> {
        let joined = items.join(self.conf.separator.as_bytes());
        match &self.mode {
            Mode::Payload => Ok(Message::with_data(joined)),
            Mode::Object { target_key, .. } => {
                let text = String::from_utf8_lossy(&joined).into_owned();
                let mut msg = Message::new();
                msg.set_value(target_key, serde_json::Value::String(text))?;
                Ok(msg)
            }
        }
    }
}

#[async_trait]
impl Transformer for AggregateToString {
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        let mut agg = self.agg.lock().await;

        if msg.is_control() {
            let mut output = agg
                .get_all()
                .map(|(_, items)| self.join(items))
                .collect::<Result<Vec<_>>>()?;
            agg.reset_all();

            output.push(msg);
            return Ok(output);
        }

        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let item = match &self.mode {
            Mode::Payload => msg.data().to_vec(),
            Mode::Object { source_key, .. } => {
                let value = msg.get_value(source_key);
                if !value.exists() {
                    debug!("{}: record has no value at {:?}, skipping", self.conf.id, source_key);
                    return Ok(vec![]);
                }
                value.bytes()
            }
        };

        let key = msg.get_value(&self.conf.object.batch_key).to_string();
        if agg.add(&key, &item) {
            return Ok(vec![]);
        }

        let output = self.join(agg.get(&key))?;
        agg.reset(&key);
        if !agg.add(&key, &item) {
            return Err(Error::BatchMisconfigured {
                id: self.conf.id.clone(),
                size: item.len(),
            });
        }

        Ok(vec![output])
    }
}

impl fmt::Display for AggregateToString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

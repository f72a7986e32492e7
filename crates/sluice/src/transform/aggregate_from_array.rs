// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;

use crate::config::{decode, fingerprint, Mode, Object};
use crate::errors::Result;
use crate::message::Message;
use crate::transform::{Context, Transformer};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    pub object: Object,
}

/// Splits a JSON array into one record per element.
///
/// In payload mode each element becomes the whole payload: strings by their
/// contents, other values as JSON text. In object mode each output is a copy
/// of the input with the element written to `object.target_key`. A value that
/// is not an array is treated as a one element array; a missing value yields
/// nothing.
pub struct AggregateFromArray {
    conf: Config,
    mode: Mode,
}

impl AggregateFromArray {
    pub fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "aggregate_from_array".to_string();
        }
        let mode = conf.object.mode()?;

        Ok(Self { conf, mode })
    }

    fn elements(value: Option<Json>) -> Vec<Json> {
        match value {
            Some(Json::Array(items)) => items,
            Some(other) => vec![other],
            None => vec![],
        }
    }
}

#[async_trait]
impl Transformer for AggregateFromArray {
    async fn transform(&self, _ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        if msg.is_control() {
            return Ok(vec![msg]);
        }

        match &self.mode {
            Mode::Payload => {
                let value = serde_json::from_slice::<Json>(msg.data()).ok();
                let output = Self::elements(value)
                    .into_iter()
                    .map(|element| {
                        let data = match element {
                            Json::String(s) => s.into_bytes(),
                            other => other.to_string().into_bytes(),
                        };
                        let mut out = Message::with_data(data);
                        out.set_metadata(msg.metadata());
                        out
                    })
                    .collect();
                Ok(output)
            }
            Mode::Object {
                source_key,
                target_key,
            } => {
                let value = msg.get_value(source_key).as_json().cloned();
                let mut output = Vec::new();
                for element in Self::elements(value) {
                    let mut out = msg.clone();
                    out.set_value(target_key, element)?;
                    output.push(out);
                }
                Ok(output)
            }
        }
    }
}

impl fmt::Display for AggregateFromArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

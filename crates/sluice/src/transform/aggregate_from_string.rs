// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{decode, fingerprint};
use crate::errors::{Error, Result};
use crate::message::Message;
use crate::transform::{Context, Transformer};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    pub separator: String,
}

/// Splits a payload on a separator, one output per fragment. Empty fragments
/// are kept so that splitting undoes `aggregate_to_string`.
///
/// Fragments keep the metadata of the record they came from.
pub struct AggregateFromString {
    conf: Config,
}

impl AggregateFromString {
    pub fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "aggregate_from_string".to_string();
        }
        if conf.separator.is_empty() {
            return Err(Error::config("separator: missing required option"));
        }

        Ok(Self { conf })
    }
}

/// Splits `data` on every occurrence of `sep`. `sep` must not be empty.
pub(crate) fn split<'a>(data: &'a [u8], sep: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
    let mut rest = Some(data);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.windows(sep.len()).position(|w| w == sep) {
            Some(at) => {
                rest = Some(&current[at + sep.len()..]);
                Some(&current[..at])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

#[async_trait]
impl Transformer for AggregateFromString {
    async fn transform(&self, _ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        if msg.is_control() {
            return Ok(vec![msg]);
        }

        let output = split(msg.data(), self.conf.separator.as_bytes())
            .map(|fragment| {
                let mut out = Message::with_data(fragment);
                out.set_metadata(msg.metadata());
                out
            })
            .collect();

        Ok(output)
    }
}

impl fmt::Display for AggregateFromString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

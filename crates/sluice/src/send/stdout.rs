// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

use crate::config::{decode, fingerprint, Batch, Object, TransformConfig};
use crate::errors::{DispatchError, Result};
use crate::message::Message;
use crate::send::{Batcher, Delivery, Dispatch};
use crate::transform::{new_chain, Context, Transformer};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    pub object: Object,
    pub batch: Batch,
    pub auxiliary_transforms: Vec<TransformConfig>,
}

/// Writes each record on its own line.
pub struct WriterDispatch {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl WriterDispatch {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl Dispatch for WriterDispatch {
    async fn dispatch(
        &self,
        _ctx: &Context,
        _key: &str,
        records: &[Vec<u8>],
    ) -> std::result::Result<Delivery, DispatchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| DispatchError::Provider("writer lock poisoned".to_string()))?;
        for record in records {
            writer.write_all(record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(Delivery::Delivered)
    }
}

/// Prints batches to stdout. Mostly useful for debugging pipelines.
pub struct SendStdout {
    conf: Config,
    batcher: Batcher<WriterDispatch>,
}

impl SendStdout {
    pub async fn new(settings: &serde_json::Value) -> Result<Self> {
        Self::with_writer(settings, Box::new(io::stdout())).await
    }

    /// Same as [`SendStdout::new`] but writes to `writer`.
    pub async fn with_writer(
        settings: &serde_json::Value,
        writer: Box<dyn Write + Send>,
    ) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "send_stdout".to_string();
        }

        let auxiliary = new_chain(&conf.auxiliary_transforms).await?;
        let batcher = Batcher::new(
            &conf.id,
            &conf.batch,
            &conf.object.batch_key,
            WriterDispatch::new(writer),
        )
        .with_auxiliary(auxiliary);

        Ok(Self { conf, batcher })
    }
}

#[async_trait]
impl Transformer for SendStdout {
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        self.batcher.transform(ctx, msg).await
    }
}

impl fmt::Display for SendStdout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

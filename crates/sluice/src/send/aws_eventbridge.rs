// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! EventBridge sink. One event per record; an empty `aws.arn` targets the
//! default bus.

use async_trait::async_trait;
use aws_sdk_eventbridge::error::DisplayErrorContext;
use aws_sdk_eventbridge::types::PutEventsRequestEntry;
use aws_sdk_eventbridge::Client;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{decode, fingerprint, Aws, Batch, Object, Retry, TransformConfig};
use crate::errors::{DispatchError, Result};
use crate::message::Message;
use crate::send::{aws::sdk_config, Batcher, Delivery, Dispatch};
use crate::transform::{new_chain, Context, Transformer};

pub const RECORD_SIZE_LIMIT: usize = 256 * 1024;
pub const MAX_BATCH_COUNT: usize = 10;
pub const MAX_BATCH_SIZE: usize = RECORD_SIZE_LIMIT;

const DEFAULT_DESCRIPTION: &str = "Sluice Transform";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    /// Sent as each event's `DetailType`. Rules route on it.
    pub description: String,
    pub object: Object,
    pub batch: Batch,
    pub aws: Aws,
    pub retry: Retry,
    pub auxiliary_transforms: Vec<TransformConfig>,
}

pub struct EventBridgeDispatch {
    client: Client,
    source: String,
    detail_type: String,
    event_bus_name: Option<String>,
}

impl EventBridgeDispatch {
    fn entry(&self, record: &[u8]) -> PutEventsRequestEntry {
        PutEventsRequestEntry::builder()
            .source(&self.source)
            .detail(String::from_utf8_lossy(record))
            .detail_type(&self.detail_type)
            .set_event_bus_name(self.event_bus_name.clone())
            .build()
    }
}

#[async_trait]
impl Dispatch for EventBridgeDispatch {
    async fn dispatch(
        &self,
        _ctx: &Context,
        _key: &str,
        records: &[Vec<u8>],
    ) -> std::result::Result<Delivery, DispatchError> {
        let entries = records.iter().map(|r| self.entry(r)).collect();

        let resp = self
            .client
            .put_events()
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| DispatchError::Provider(DisplayErrorContext(&e).to_string()))?;

        let failed = resp
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.error_code().is_some())
            .map(|(i, _)| i)
            .collect();
        Ok(Delivery::from_failed(failed))
    }
}

pub struct SendAwsEventBridge {
    conf: Config,
    batcher: Batcher<EventBridgeDispatch>,
}

impl SendAwsEventBridge {
    pub async fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "send_aws_eventbridge".to_string();
        }
        if conf.description.is_empty() {
            conf.description = DEFAULT_DESCRIPTION.to_string();
        }

        let auxiliary = new_chain(&conf.auxiliary_transforms).await?;
        let sdk = sdk_config(&conf.aws).await;
        let dispatcher = EventBridgeDispatch {
            client: Client::new(&sdk),
            source: format!("sluice.{}", conf.id),
            detail_type: conf.description.clone(),
            event_bus_name: Some(conf.aws.arn.clone()).filter(|arn| !arn.is_empty()),
        };

        let batch = conf.batch.clamped(MAX_BATCH_COUNT, MAX_BATCH_SIZE);
        let batcher = Batcher::new(&conf.id, &batch, &conf.object.batch_key, dispatcher)
            .with_record_limit(RECORD_SIZE_LIMIT)
            .with_retry(conf.retry.clone())
            .with_auxiliary(auxiliary);

        Ok(Self { conf, batcher })
    }
}

#[async_trait]
impl Transformer for SendAwsEventBridge {
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        self.batcher.transform(ctx, msg).await
    }
}

impl fmt::Display for SendAwsEventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

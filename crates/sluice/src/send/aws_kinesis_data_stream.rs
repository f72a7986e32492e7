// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Kinesis Data Streams sink.

use async_trait::async_trait;
use aws_sdk_kinesis::error::DisplayErrorContext;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::PutRecordsRequestEntry;
use aws_sdk_kinesis::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::{decode, fingerprint, Aws, Batch, Object, Retry, TransformConfig};
use crate::errors::{DispatchError, Error, Result};
use crate::message::Message;
use crate::send::kinesis_aggregate::{self, Packed};
use crate::send::{aws::sdk_config, Batcher, Delivery, Dispatch};
use crate::transform::{new_chain, Context, Transformer};

/// Largest record PutRecords accepts.
pub const RECORD_SIZE_LIMIT: usize = 1_000_000;
/// PutRecords per-call maxima.
pub const MAX_BATCH_COUNT: usize = 500;
pub const MAX_BATCH_SIZE: usize = 5 * RECORD_SIZE_LIMIT;

const MAX_PARTITION_KEY_LEN: usize = 256;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    pub object: Object,
    pub batch: Batch,
    pub aws: Aws,
    pub retry: Retry,
    pub auxiliary_transforms: Vec<TransformConfig>,
    /// Use the batch key as the partition key instead of a random one per
    /// batch, so records sharing a key land on the same shard.
    pub use_batch_key_as_partition_key: bool,
    /// Pack each batch into KPL aggregated records of up to 1 MiB.
    pub enable_record_aggregation: bool,
}

pub struct KinesisDispatch {
    client: Client,
    stream_arn: String,
    use_batch_key_as_partition_key: bool,
    enable_record_aggregation: bool,
}

impl KinesisDispatch {
    fn partition_key(&self, key: &str) -> String {
        if self.use_batch_key_as_partition_key && !key.is_empty() {
            return key.chars().take(MAX_PARTITION_KEY_LEN).collect();
        }
        Uuid::new_v4().to_string()
    }

    /// Kinesis records for one call, each mapped back to the batch positions
    /// it carries.
    fn pack(
        &self,
        partition_key: &str,
        records: &[Vec<u8>],
    ) -> std::result::Result<Vec<Packed>, DispatchError> {
        if self.enable_record_aggregation {
            return kinesis_aggregate::pack(partition_key, records);
        }
        Ok(records
            .iter()
            .enumerate()
            .map(|(i, record)| Packed {
                data: record.clone(),
                members: i..i + 1,
            })
            .collect())
    }
}

#[async_trait]
impl Dispatch for KinesisDispatch {
    async fn dispatch(
        &self,
        _ctx: &Context,
        key: &str,
        records: &[Vec<u8>],
    ) -> std::result::Result<Delivery, DispatchError> {
        let partition_key = self.partition_key(key);
        let packed = self.pack(&partition_key, records)?;
        let entries = packed
            .iter()
            .map(|p| {
                PutRecordsRequestEntry::builder()
                    .data(Blob::new(p.data.as_slice()))
                    .partition_key(&partition_key)
                    .build()
                    .map_err(|e| DispatchError::Provider(e.to_string()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let resp = self
            .client
            .put_records()
            .stream_arn(&self.stream_arn)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| DispatchError::Provider(DisplayErrorContext(&e).to_string()))?;

        // A rejected aggregate rejects every record packed into it.
        let failed = resp
            .records()
            .iter()
            .zip(&packed)
            .filter(|(r, _)| r.error_code().is_some())
            .flat_map(|(_, p)| p.members.clone())
            .collect();
        Ok(Delivery::from_failed(failed))
    }
}

pub struct SendAwsKinesisDataStream {
    conf: Config,
    batcher: Batcher<KinesisDispatch>,
}

impl SendAwsKinesisDataStream {
    pub async fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "send_aws_kinesis_data_stream".to_string();
        }
        if conf.aws.arn.is_empty() {
            return Err(Error::config("aws.arn: missing required option"));
        }

        let auxiliary = new_chain(&conf.auxiliary_transforms).await?;
        let sdk = sdk_config(&conf.aws).await;
        let dispatcher = KinesisDispatch {
            client: Client::new(&sdk),
            stream_arn: conf.aws.arn.clone(),
            use_batch_key_as_partition_key: conf.use_batch_key_as_partition_key,
            enable_record_aggregation: conf.enable_record_aggregation,
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
impl Transformer for SendAwsKinesisDataStream {
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        self.batcher.transform(ctx, msg).await
    }
}

impl fmt::Display for SendAwsKinesisDataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lambda sink. Each buffered record is sent as one asynchronous invocation.

use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::config::{decode, fingerprint, Aws, Batch, Object, Retry, TransformConfig};
use crate::errors::{DispatchError, Error, Result};
use crate::message::Message;
use crate::send::{aws::sdk_config, Batcher, Delivery, Dispatch};
use crate::transform::{new_chain, Context, Transformer};

/// Largest payload accepted for an `Event` invocation.
pub const RECORD_SIZE_LIMIT: usize = 256 * 1024;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    pub object: Object,
    pub batch: Batch,
    pub aws: Aws,
    pub retry: Retry,
    pub auxiliary_transforms: Vec<TransformConfig>,
}

pub struct LambdaDispatch {
    client: Client,
    function_arn: String,
}

#[async_trait]
impl Dispatch for LambdaDispatch {
    async fn dispatch(
        &self,
        _ctx: &Context,
        _key: &str,
        records: &[Vec<u8>],
    ) -> std::result::Result<Delivery, DispatchError> {
        let mut failed = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let res = self
                .client
                .invoke()
                .function_name(&self.function_arn)
                .invocation_type(InvocationType::Event)
                .payload(Blob::new(record.as_slice()))
                .send()
                .await;
            if let Err(e) = res {
                warn!(
                    "invoking {} failed for record {}: {}",
                    self.function_arn,
                    i,
                    DisplayErrorContext(&e)
                );
                failed.push(i);
            }
        }
        Ok(Delivery::from_failed(failed))
    }
}

pub struct SendAwsLambda {
    conf: Config,
    batcher: Batcher<LambdaDispatch>,
}

impl SendAwsLambda {
    pub async fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "send_aws_lambda".to_string();
        }
        if conf.aws.arn.is_empty() {
            return Err(Error::config("aws.arn: missing required option"));
        }

        let auxiliary = new_chain(&conf.auxiliary_transforms).await?;
        let sdk = sdk_config(&conf.aws).await;
        let dispatcher = LambdaDispatch {
            client: Client::new(&sdk),
            function_arn: conf.aws.arn.clone(),
        };

        let batcher = Batcher::new(&conf.id, &conf.batch, &conf.object.batch_key, dispatcher)
            .with_record_limit(RECORD_SIZE_LIMIT)
            .with_retry(conf.retry.clone())
            .with_auxiliary(auxiliary);

        Ok(Self { conf, batcher })
    }
}

#[async_trait]
impl Transformer for SendAwsLambda {
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        self.batcher.transform(ctx, msg).await
    }
}

impl fmt::Display for SendAwsLambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP sink. Each buffered record is POSTed as its own request body.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{decode, fingerprint, Batch, Object, Retry, TransformConfig};
use crate::errors::{DispatchError, Error, Result};
use crate::message::Message;
use crate::send::{Batcher, Delivery, Dispatch};
use crate::transform::{new_chain, Context, Transformer};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    pub object: Object,
    pub batch: Batch,
    pub retry: Retry,
    pub auxiliary_transforms: Vec<TransformConfig>,
    /// Endpoint that receives the records. Required.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout, 30s when unset.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

pub struct HttpPostDispatch {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl HttpPostDispatch {
    async fn post(&self, record: &[u8]) -> std::result::Result<(), DispatchError> {
        let resp = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(record.to_vec())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!("POST {} returned {}", self.url, status);
        Ok(())
    }
}

#[async_trait]
impl Dispatch for HttpPostDispatch {
    /// Every record is attempted; the ones that failed are reported back for
    /// resubmission.
    async fn dispatch(
        &self,
        _ctx: &Context,
        _key: &str,
        records: &[Vec<u8>],
    ) -> std::result::Result<Delivery, DispatchError> {
        let mut failed = Vec::new();
        for (i, record) in records.iter().enumerate() {
            if let Err(e) = self.post(record).await {
                warn!("POST {} failed for record {}: {}", self.url, i, e);
                failed.push(i);
            }
        }
        Ok(Delivery::from_failed(failed))
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config(format!("headers: {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::config(format!("headers: {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

pub struct SendHttpPost {
    conf: Config,
    batcher: Batcher<HttpPostDispatch>,
}

impl SendHttpPost {
    pub async fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "send_http_post".to_string();
        }
        if conf.url.is_empty() {
            return Err(Error::config("url: missing required option"));
        }

        let client = reqwest::Client::builder()
            .timeout(conf.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| Error::config(format!("building HTTP client: {e}")))?;
        let dispatcher = HttpPostDispatch {
            client,
            url: conf.url.clone(),
            headers: header_map(&conf.headers)?,
        };

        let auxiliary = new_chain(&conf.auxiliary_transforms).await?;
        let batcher = Batcher::new(&conf.id, &conf.batch, &conf.object.batch_key, dispatcher)
            .with_retry(conf.retry.clone())
            .with_auxiliary(auxiliary);

        Ok(Self { conf, batcher })
    }
}

#[async_trait]
impl Transformer for SendHttpPost {
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        self.batcher.transform(ctx, msg).await
    }
}

impl fmt::Display for SendHttpPost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

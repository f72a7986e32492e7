// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batched delivery to external sinks.
//!
//! Every sink is a [`Batcher`] around a [`Dispatch`] implementation. The
//! batcher buffers record payloads per batch key, passes each record through
//! unchanged, and delivers a key's buffer when it overflows or when a control
//! record arrives. Delivery runs the auxiliary transforms over the buffer,
//! then hands the result to the dispatcher, resubmitting whatever a partially
//! failed call reports as rejected.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::aggregate::Aggregator;
use crate::config::{Batch, Retry};
use crate::errors::{DispatchError, Error, Result};
use crate::message::Message;
use crate::transform::{apply, Context, Transformer};

pub mod aws;
pub mod aws_eventbridge;
pub mod aws_kinesis_data_stream;
pub mod aws_lambda;
pub mod http_post;
pub mod kinesis_aggregate;
pub mod stdout;

/// Outcome of one batch call that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Indices into the submitted slice of the records that were rejected.
    Partial { failed: Vec<usize> },
}

impl Delivery {
    pub fn from_failed(failed: Vec<usize>) -> Self {
        if failed.is_empty() {
            Self::Delivered
        } else {
            Self::Partial { failed }
        }
    }
}

/// A provider batch-put call.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Submits `records`, all buffered under `key`, in one call.
    async fn dispatch(
        &self,
        ctx: &Context,
        key: &str,
        records: &[Vec<u8>],
    ) -> std::result::Result<Delivery, DispatchError>;
}

/// Keyed buffering in front of a [`Dispatch`].
///
/// One lock covers the aggregator and the whole add, flush and retry
/// sequence, so a slow dispatch holds up other callers of the same sink.
pub struct Batcher<D> {
    id: String,
    batch_key: String,
    record_limit: Option<usize>,
    retry: Retry,
    auxiliary: Vec<Arc<dyn Transformer>>,
    agg: Mutex<Aggregator>,
    dispatcher: D,
}

impl<D: Dispatch> Batcher<D> {
    pub fn new(id: &str, batch: &Batch, batch_key: &str, dispatcher: D) -> Self {
        Self {
            id: id.to_string(),
            batch_key: batch_key.to_string(),
            record_limit: None,
            retry: Retry::default(),
            auxiliary: Vec::new(),
            agg: Mutex::new(Aggregator::new(batch)),
            dispatcher,
        }
    }

    /// Rejects any record larger than `limit` bytes.
    #[must_use]
    pub fn with_record_limit(mut self, limit: usize) -> Self {
        self.record_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    /// Transforms applied to each drained buffer before it is dispatched.
    #[must_use]
    pub fn with_auxiliary(mut self, auxiliary: Vec<Arc<dyn Transformer>>) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Runs the auxiliary transforms over `items` and delivers the result.
    ///
    /// A flush that has started is not abandoned when the caller is
    /// cancelled, so everything past this point runs detached.
    async fn flush(&self, ctx: &Context, key: &str, items: &[Vec<u8>]) -> Result<()> {
        let ctx = ctx.detached();
        let mut msgs: Vec<Message> = items
            .iter()
            .map(|i| Message::with_data(i.as_slice()))
            .collect();
        msgs.push(Message::control());

        let records: Vec<Vec<u8>> = apply(&ctx, &self.auxiliary, msgs)
            .await?
            .into_iter()
            .filter(|m| !m.is_control())
            .map(Message::into_data)
            .collect();
        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        if let Err(source) = self.deliver(&ctx, key, records).await {
            error!("{}: failed to deliver batch for key {:?}: {}", self.id, key, source);
            return Err(Error::Dispatch {
                id: self.id.clone(),
                source,
            });
        }

        debug!("{}: delivered {} records for key {:?}", self.id, count, key);
        Ok(())
    }

    async fn deliver(
        &self,
        ctx: &Context,
        key: &str,
        mut pending: Vec<Vec<u8>>,
    ) -> std::result::Result<(), DispatchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let failed = match self.dispatcher.dispatch(ctx, key, &pending).await? {
                Delivery::Delivered => return Ok(()),
                Delivery::Partial { mut failed } => {
                    failed.sort_unstable();
                    failed.dedup();
                    failed
                }
            };

            pending = pending
                .into_iter()
                .enumerate()
                .filter(|(i, _)| failed.binary_search(i).is_ok())
                .map(|(_, record)| record)
                .collect();
            if pending.is_empty() {
                return Ok(());
            }

            if attempts >= max_attempts {
                return Err(DispatchError::RetriesExhausted {
                    remaining: pending.len(),
                    attempts,
                });
            }

            warn!(
                "{}: {} records rejected on attempt {}, resubmitting",
                self.id,
                pending.len(),
                attempts
            );
            if let Some(backoff) = self.retry.backoff {
                tokio::time::sleep(backoff * attempts).await;
            }
        }
    }
}

#[async_trait]
impl<D: Dispatch> Transformer for Batcher<D> {
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        let mut agg = self.agg.lock().await;

        if msg.is_control() {
            for key in agg.keys() {
                self.flush(ctx, &key, agg.get(&key)).await?;
                agg.reset(&key);
            }
            agg.reset_all();

            return Ok(vec![msg]);
        }

        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(limit) = self.record_limit {
            if msg.data().len() > limit {
                return Err(Error::SizeLimit {
                    id: self.id.clone(),
                    size: msg.data().len(),
                    limit,
                });
            }
        }

        let key = msg.get_value(&self.batch_key).to_string();
        if agg.add(&key, msg.data()) {
            return Ok(vec![msg]);
        }

        self.flush(ctx, &key, agg.get(&key)).await?;
        agg.reset(&key);
        if !agg.add(&key, msg.data()) {
            return Err(Error::BatchMisconfigured {
                id: self.id.clone(),
                size: msg.data().len(),
            });
        }

        Ok(vec![msg])
    }
}

impl<D> fmt::Display for Batcher<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The transform capability and the chain executor.
//!
//! ```text
//! [msgs.., control] -> [stage 1] -> [stage 2] -> ... -> [msgs'.., control]
//! ```
//!
//! Each stage is called once per message in the working list and whatever it
//! returns is concatenated, in call order, into the next working list.
//! Stages that buffer must still forward the control message, emitting their
//! flushed groups no later than it.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::TransformConfig;
use crate::errors::{Error, Result};
use crate::message::Message;
use crate::send;

pub mod aggregate_from_array;
pub mod aggregate_from_string;
pub mod aggregate_to_array;
pub mod aggregate_to_string;
pub mod utility;

/// Caller scope for a `transform` call.
///
/// Cancellation governs buffering and validation. Sinks switch to
/// [`Context::detached`] before a batch call so an in-flight delivery is not
/// abandoned while the pipeline shuts down.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A context nothing can cancel.
    pub fn detached(&self) -> Self {
        Self {
            cancel: CancellationToken::new(),
        }
    }
}

/// A pipeline stage.
///
/// Implementors must be `Send + Sync`: the same instance may be called from
/// several tasks at once. `Display` renders the stage's settings and is only
/// used for diagnostics.
#[async_trait]
pub trait Transformer: fmt::Display + Send + Sync {
    /// Returns zero, one or many messages for `msg`.
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>>;

    /// Releases resources. Buffered data is not flushed here; send a control
    /// message first.
    async fn close(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Runs `msgs` through `transforms` in order.
///
/// The first error aborts the whole call and nothing is returned.
pub async fn apply(
    ctx: &Context,
    transforms: &[Arc<dyn Transformer>],
    msgs: Vec<Message>,
) -> Result<Vec<Message>> {
    let mut results = msgs;

    for tf in transforms {
        if results.is_empty() {
            break;
        }

        let mut next = Vec::with_capacity(results.len());
        for msg in results {
            next.extend(tf.transform(ctx, msg).await?);
        }
        results = next;
    }

    Ok(results)
}

pub type TransformFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<dyn Transformer>>> + Send + 'a>>;

/// Builds a transform from its configuration.
///
/// Boxed because sinks build their auxiliary transforms through it.
pub fn new(cfg: &TransformConfig) -> TransformFuture<'_> {
    Box::pin(async move {
        debug!("Building transform {}", cfg.kind);
        let settings = &cfg.settings;
        let tf: Arc<dyn Transformer> = match cfg.kind.as_str() {
            "aggregate_from_array" => {
                Arc::new(aggregate_from_array::AggregateFromArray::new(settings)?)
            }
            "aggregate_from_string" => {
                Arc::new(aggregate_from_string::AggregateFromString::new(settings)?)
            }
            "aggregate_to_array" => Arc::new(aggregate_to_array::AggregateToArray::new(settings)?),
            "aggregate_to_string" => {
                Arc::new(aggregate_to_string::AggregateToString::new(settings)?)
            }
            "send_aws_eventbridge" => {
                Arc::new(send::aws_eventbridge::SendAwsEventBridge::new(settings).await?)
            }
            "send_aws_kinesis_data_stream" => Arc::new(
                send::aws_kinesis_data_stream::SendAwsKinesisDataStream::new(settings).await?,
            ),
            "send_aws_lambda" => Arc::new(send::aws_lambda::SendAwsLambda::new(settings).await?),
            "send_http_post" => Arc::new(send::http_post::SendHttpPost::new(settings).await?),
            "send_stdout" => Arc::new(send::stdout::SendStdout::new(settings).await?),
            "utility_control" => Arc::new(utility::UtilityControl::new(settings)?),
            "utility_drop" => Arc::new(utility::UtilityDrop::new(settings)?),
            other => return Err(Error::config(format!("unknown transform type {other:?}"))),
        };
        Ok(tf)
    })
}

/// Builds every transform in `cfgs`, preserving order.
pub async fn new_chain(cfgs: &[TransformConfig]) -> Result<Vec<Arc<dyn Transformer>>> {
    let mut chain = Vec::with_capacity(cfgs.len());
    for cfg in cfgs {
        chain.push(new(cfg).await?);
    }
    Ok(chain)
}

/// Renders a JSON array from raw items.
///
/// Items that are valid JSON are embedded verbatim; anything else becomes a
/// JSON string.
pub(crate) fn items_to_array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(items.iter().map(|i| i.len() + 1).sum::<usize>() + 2);
    buffer.push(b'[');
    for item in items {
        if serde_json::from_slice::<serde::de::IgnoredAny>(item).is_ok() {
            buffer.extend_from_slice(item);
        } else {
            let text = String::from_utf8_lossy(item);
            buffer.extend(serde_json::to_vec(&text).unwrap_or_default());
        }
        buffer.push(b',');
    }
    if buffer.len() > 1 {
        buffer.pop();
    }
    buffer.push(b']');
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits each message twice and counts calls.
    struct Duplicate {
        calls: AtomicUsize,
    }

    impl fmt::Display for Duplicate {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "duplicate")
        }
    }

    #[async_trait]
    impl Transformer for Duplicate {
        async fn transform(&self, _ctx: &Context, msg: Message) -> Result<Vec<Message>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![msg.clone(), msg])
        }
    }

    struct Fail;

    impl fmt::Display for Fail {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fail")
        }
    }

    #[async_trait]
    impl Transformer for Fail {
        async fn transform(&self, _ctx: &Context, msg: Message) -> Result<Vec<Message>> {
            if msg.data() == b"bad" {
                return Err(Error::transform("fail", "bad message"));
            }
            Ok(vec![msg])
        }
    }

    #[tokio::test]
    async fn test_apply_concatenates_in_call_order() {
        let dup = Arc::new(Duplicate {
            calls: AtomicUsize::new(0),
        });
        let chain: Vec<Arc<dyn Transformer>> = vec![dup.clone(), dup.clone()];

        let out = apply(
            &Context::new(),
            &chain,
            vec![Message::with_data("a"), Message::with_data("b")],
        )
        .await
        .unwrap();

        let data: Vec<&[u8]> = out.iter().map(Message::data).collect();
        assert_eq!(data, vec![&b"a"[..], b"a", b"a", b"a", b"b", b"b", b"b", b"b"]);
        assert_eq!(dup.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_apply_aborts_on_first_error() {
        let chain: Vec<Arc<dyn Transformer>> = vec![Arc::new(Fail)];
        let res = apply(
            &Context::new(),
            &chain,
            vec![Message::with_data("ok"), Message::with_data("bad")],
        )
        .await;
        assert!(matches!(res, Err(Error::Transform { .. })));
    }

    #[tokio::test]
    async fn test_apply_empty_chain_returns_input() {
        let msgs = vec![Message::with_data("a"), Message::control()];
        let out = apply(&Context::new(), &[], msgs.clone()).await.unwrap();
        assert_eq!(out, msgs);
    }

    #[tokio::test]
    async fn test_new_rejects_unknown_type() {
        let res = new(&TransformConfig::new("does_not_exist", json!({}))).await;
        assert!(matches!(res, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_new_chain_builds_in_order() {
        let chain = new_chain(&[
            TransformConfig::new("aggregate_to_array", json!({"id": "first"})),
            TransformConfig::new("utility_drop", serde_json::Value::Null),
        ])
        .await
        .unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[0].to_string().contains("\"first\""));
    }

    #[test]
    fn test_context_detached_is_never_cancelled() {
        let token = CancellationToken::new();
        let ctx = Context::with_cancellation(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(!ctx.detached().is_cancelled());
    }

    #[test]
    fn test_items_to_array() {
        let items = vec![
            br#"{"a":"b"}"#.to_vec(),
            b"plain".to_vec(),
            b"42".to_vec(),
        ];
        assert_eq!(items_to_array(&items), br#"[{"a":"b"},"plain",42]"#.to_vec());
        assert_eq!(items_to_array(&[]), b"[]".to_vec());
    }
}

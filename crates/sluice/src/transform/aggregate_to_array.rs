// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups records into JSON arrays.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::aggregate::Aggregator;
use crate::config::{decode, fingerprint, Batch, Mode, Object};
use crate::errors::{Error, Result};
use crate::message::Message;
use crate::transform::{items_to_array, Context, Transformer};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub id: String,
    pub object: Object,
    pub batch: Batch,
}

pub struct AggregateToArray {
    conf: Config,
    mode: Mode,
    agg: Mutex<Aggregator>,
}

impl AggregateToArray {
    pub fn new(settings: &serde_json::Value) -> Result<Self> {
        let mut conf: Config = decode(settings)?;
        if conf.id.is_empty() {
            conf.id = "aggregate_to_array".to_string();
        }
        let mode = conf.object.mode()?;

        Ok(Self {
            agg: Mutex::new(Aggregator::new(&conf.batch)),
            mode,
            conf,
        })
    }

    fn group(&self, items: &[Vec<u8>]) -> Result<Message> {
        let array = items_to_array(items);
        match &self.mode {
            Mode::Payload => Ok(Message::with_data(array)),
            Mode::Object { target_key, .. } => {
                let value = serde_json::from_slice(&array)
                    .map_err(|e| Error::transform(&self.conf.id, e.to_string()))?;
                let mut msg = Message::new();
                msg.set_value(target_key, value)?;
                Ok(msg)
            }
        }
    }
}

#[async_trait]
impl Transformer for AggregateToArray {
    async fn transform(&self, ctx: &Context, msg: Message) -> Result<Vec<Message>> {
        let mut agg = self.agg.lock().await;

        if msg.is_control() {
            let mut output = Vec::new();
            for (key, items) in agg.get_all() {
                debug!("{}: flushing {} items for key {:?}", self.conf.id, items.len(), key);
                output.push(self.group(items)?);
            }
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
                let Some(json) = value.as_json() else {
                    debug!("{}: record has no value at {:?}, skipping", self.conf.id, source_key);
                    return Ok(vec![]);
                };
                // JSON text, so string values stay strings when the array is built.
                serde_json::to_vec(json)
                    .map_err(|e| Error::transform(&self.conf.id, e.to_string()))?
            }
        };

        // Records without the batch key share the empty key.
        let key = msg.get_value(&self.conf.object.batch_key).to_string();
        if agg.add(&key, &item) {
            return Ok(vec![]);
        }

        let output = self.group(agg.get(&key))?;
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

impl fmt::Display for AggregateToArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fingerprint(&self.conf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::apply;
    use serde_json::json;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn input() -> Vec<Message> {
        vec![
            Message::with_data(r#"{"a":"b"}"#),
            Message::with_data(r#"{"c":"d"}"#),
            Message::with_data(r#"{"e":"f"}"#),
            Message::control(),
        ]
    }

    async fn run(settings: serde_json::Value, msgs: Vec<Message>) -> Vec<Message> {
        let tf: Arc<dyn Transformer> = Arc::new(AggregateToArray::new(&settings).unwrap());
        apply(&Context::new(), &[tf], msgs).await.unwrap()
    }

    fn data(msgs: &[Message]) -> Vec<String> {
        msgs.iter()
            .filter(|m| !m.is_control())
            .map(|m| String::from_utf8_lossy(m.data()).to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_group_by_count() {
        let out = run(json!({"batch": {"count": 2}}), input()).await;

        assert_eq!(
            data(&out),
            vec![r#"[{"a":"b"},{"c":"d"}]"#, r#"[{"e":"f"}]"#]
        );
        assert!(out.last().unwrap().is_control());
        assert_eq!(out.iter().filter(|m| m.is_control()).count(), 1);
    }

    #[tokio::test]
    async fn test_group_by_key() {
        let out = run(json!({"object": {"batch_key": "c"}}), input()).await;

        let mut groups = data(&out);
        groups.sort();
        assert_eq!(groups, vec![r#"[{"a":"b"},{"e":"f"}]"#, r#"[{"c":"d"}]"#]);
        assert!(out.last().unwrap().is_control());
    }

    #[tokio::test]
    async fn test_absorbs_until_control() {
        let tf = AggregateToArray::new(&serde_json::Value::Null).unwrap();
        let ctx = Context::new();

        assert!(tf
            .transform(&ctx, Message::with_data("1"))
            .await
            .unwrap()
            .is_empty());
        let out = tf.transform(&ctx, Message::control()).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].data(), b"[1]");

        // Buffers were reset by the control message.
        let out = tf.transform(&ctx, Message::control()).await.unwrap();
        assert_eq!(out, vec![Message::control()]);
    }

    #[tokio::test]
    async fn test_object_mode() {
        let out = run(
            json!({"object": {"source_key": "a", "target_key": "x.y"}}),
            vec![
                Message::with_data(r#"{"a":1}"#),
                Message::with_data(r#"{"a":"two"}"#),
                Message::with_data(r#"{"b":3}"#),
                Message::control(),
            ],
        )
        .await;

        assert_eq!(data(&out), vec![r#"{"x":{"y":[1,"two"]}}"#]);
    }

    #[tokio::test]
    async fn test_object_mode_keeps_string_values() {
        let out = run(
            json!({"object": {"source_key": "a", "target_key": "x"}}),
            vec![
                Message::with_data(r#"{"a":"42"}"#),
                Message::with_data(r#"{"a":"true"}"#),
                Message::with_data(r#"{"a":{"b":"[1]"}}"#),
                Message::control(),
            ],
        )
        .await;

        assert_eq!(data(&out), vec![r#"{"x":["42","true",{"b":"[1]"}]}"#]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_object_mode_logs_skipped_records() {
        let out = run(
            json!({"object": {"source_key": "a", "target_key": "x"}}),
            vec![Message::with_data(r#"{"b":1}"#), Message::control()],
        )
        .await;

        assert_eq!(out, vec![Message::control()]);
        assert!(logs_contain("record has no value at \"a\", skipping"));
    }

    #[tokio::test]
    async fn test_item_larger_than_size_limit_is_misconfigured() {
        let tf = AggregateToArray::new(&json!({"batch": {"size": 4}})).unwrap();
        let ctx = Context::new();

        tf.transform(&ctx, Message::with_data("123")).await.unwrap();
        let res = tf.transform(&ctx, Message::with_data("12345")).await;
        assert!(matches!(res, Err(Error::BatchMisconfigured { size: 5, .. })));
    }

    #[tokio::test]
    async fn test_cancelled_context_rejects_data_but_flushes() {
        let tf = AggregateToArray::new(&serde_json::Value::Null).unwrap();
        let ctx = Context::new();
        tf.transform(&ctx, Message::with_data("1")).await.unwrap();

        ctx.cancellation_token().cancel();
        let res = tf.transform(&ctx, Message::with_data("2")).await;
        assert!(matches!(res, Err(Error::Cancelled)));

        let out = tf.transform(&ctx, Message::control()).await.unwrap();
        assert_eq!(out[0].data(), b"[1]");
    }

    #[test]
    fn test_invalid_object_config() {
        let res = AggregateToArray::new(&json!({"object": {"source_key": "a"}}));
        assert!(matches!(res, Err(Error::Config(_))));
    }

    #[test]
    fn test_display_is_settings_json() {
        let tf = AggregateToArray::new(&json!({"batch": {"count": 2}})).unwrap();
        let fingerprint: serde_json::Value = serde_json::from_str(&tf.to_string()).unwrap();
        assert_eq!(fingerprint["id"], "aggregate_to_array");
        assert_eq!(fingerprint["batch"]["count"], 2);
    }
}

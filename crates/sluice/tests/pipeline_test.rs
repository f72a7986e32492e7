// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::mocks::RecordingDispatch;
use proptest::prelude::*;
use serde_json::json;
use sluice::config::{Batch, PipelineConfig, TransformConfig};
use sluice::send::Batcher;
use sluice::transform::{self, new_chain};
use sluice::{apply, Context, Message, Transformer};
use std::sync::Arc;

fn input() -> Vec<Message> {
    vec![
        Message::with_data(r#"{"a":"b"}"#),
        Message::with_data(r#"{"c":"d"}"#),
        Message::with_data(r#"{"e":"f"}"#),
        Message::control(),
    ]
}

fn payloads(msgs: &[Message]) -> Vec<String> {
    msgs.iter()
        .filter(|m| !m.is_control())
        .map(|m| String::from_utf8_lossy(m.data()).to_string())
        .collect()
}

#[tokio::test]
async fn test_grouping_by_count_emits_overflow_group_first() {
    let chain = new_chain(&[TransformConfig::new(
        "aggregate_to_array",
        json!({"batch": {"count": 2}}),
    )])
    .await
    .unwrap();

    let out = apply(&Context::new(), &chain, input()).await.unwrap();

    assert_eq!(
        payloads(&out),
        vec![r#"[{"a":"b"},{"c":"d"}]"#, r#"[{"e":"f"}]"#]
    );
    assert_eq!(out.len(), 3);
    assert!(out[2].is_control());
}

#[tokio::test]
async fn test_grouping_by_key_flushes_on_control() {
    let chain = new_chain(&[TransformConfig::new(
        "aggregate_to_array",
        json!({"object": {"batch_key": "c"}}),
    )])
    .await
    .unwrap();

    let out = apply(&Context::new(), &chain, input()).await.unwrap();

    let mut groups = payloads(&out);
    groups.sort();
    assert_eq!(groups, vec![r#"[{"a":"b"},{"e":"f"}]"#, r#"[{"c":"d"}]"#]);
    assert!(out.last().unwrap().is_control());
}

#[tokio::test]
async fn test_array_round_trip_through_chain() {
    let chain = new_chain(&[
        TransformConfig::new("aggregate_to_array", json!({})),
        TransformConfig::new("aggregate_from_array", json!({})),
    ])
    .await
    .unwrap();

    let out = apply(&Context::new(), &chain, input()).await.unwrap();
    assert_eq!(
        payloads(&out),
        vec![r#"{"a":"b"}"#, r#"{"c":"d"}"#, r#"{"e":"f"}"#]
    );
}

#[tokio::test]
async fn test_error_aborts_whole_call() {
    let chain = new_chain(&[TransformConfig::new(
        "aggregate_to_array",
        json!({"batch": {"size": 3}}),
    )])
    .await
    .unwrap();

    let res = apply(&Context::new(), &chain, input()).await;
    assert!(res.is_err());
}

#[test]
fn test_pipeline_config_builds_every_local_transform() {
    let conf: PipelineConfig = serde_json::from_value(json!({
        "transforms": [
            {"type": "aggregate_from_string", "settings": {"separator": "\n"}},
            {"type": "aggregate_from_array"},
            {"type": "utility_control", "settings": {"batch": {"count": 100}}},
            {"type": "aggregate_to_string", "settings": {"separator": ","}},
            {"type": "send_stdout"},
            {"type": "utility_drop"}
        ]
    }))
    .unwrap();

    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let chain = rt.block_on(new_chain(&conf.transforms)).unwrap();
    assert_eq!(chain.len(), 6);
}

/// Alternates grouping transforms and sinks.
async fn stateful_chain(stages: usize, count: usize) -> Vec<Arc<dyn Transformer>> {
    let mut chain: Vec<Arc<dyn Transformer>> = Vec::with_capacity(stages);
    for i in 0..stages {
        if i % 2 == 0 {
            chain.push(
                transform::new(&TransformConfig::new(
                    "aggregate_to_array",
                    json!({"batch": {"count": count}}),
                ))
                .await
                .unwrap(),
            );
        } else {
            let batch = Batch {
                count,
                ..Batch::default()
            };
            chain.push(Arc::new(Batcher::new(
                "sink",
                &batch,
                "",
                RecordingDispatch::default(),
            )));
        }
    }
    chain
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_one_control_in_one_control_out(
        stages in 1usize..6,
        count in 1usize..4,
        records in 0usize..20,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let out = rt.block_on(async {
            let chain = stateful_chain(stages, count).await;
            let mut msgs: Vec<Message> =
                (0..records).map(|i| Message::with_data(i.to_string())).collect();
            msgs.push(Message::control());
            apply(&Context::new(), &chain, msgs).await.unwrap()
        });

        prop_assert_eq!(out.iter().filter(|m| m.is_control()).count(), 1);
        prop_assert!(out.last().unwrap().is_control());
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock dispatchers that record what the batcher sends

use sluice::send::{Delivery, Dispatch};
use sluice::{Context, DispatchError};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One observed batch call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub key: String,
    pub records: Vec<Vec<u8>>,
    pub cancelled: bool,
}

/// Accepts every record unless told otherwise.
///
/// Each entry queued with `fail_next` rejects those indices on one call.
#[derive(Default)]
pub struct RecordingDispatch {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<VecDeque<Vec<usize>>>,
}

#[allow(dead_code)]
impl RecordingDispatch {
    pub fn fail_next(&self, indices: Vec<usize>) {
        self.failures.lock().unwrap().push_back(indices);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.records.len())
            .sum()
    }
}

#[async_trait::async_trait]
impl Dispatch for RecordingDispatch {
    async fn dispatch(
        &self,
        ctx: &Context,
        key: &str,
        records: &[Vec<u8>],
    ) -> Result<Delivery, DispatchError> {
        self.calls.lock().unwrap().push(Call {
            key: key.to_string(),
            records: records.to_vec(),
            cancelled: ctx.is_cancelled(),
        });

        let failed = self.failures.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Delivery::from_failed(failed))
    }
}

/// Fails every call outright.
#[allow(dead_code)]
pub struct BrokenDispatch;

#[async_trait::async_trait]
impl Dispatch for BrokenDispatch {
    async fn dispatch(
        &self,
        _ctx: &Context,
        _key: &str,
        _records: &[Vec<u8>],
    ) -> Result<Delivery, DispatchError> {
        Err(DispatchError::Provider("service unavailable".to_string()))
    }
}

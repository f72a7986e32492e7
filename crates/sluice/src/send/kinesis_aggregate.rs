// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! KPL aggregated records: many user records packed into one Kinesis record.
//!
//! A packed record is the 4-byte magic, a protobuf `AggregatedRecord`, and
//! the MD5 digest of the protobuf bytes. Every user record in a batch shares
//! the batch's partition key, so the key table holds a single entry.

use protobuf::CodedOutputStream;
use std::ops::Range;

use crate::errors::DispatchError;

pub const MAGIC: [u8; 4] = [0xf3, 0x89, 0x9a, 0xc2];
pub const DIGEST_LEN: usize = 16;
/// Kinesis record limit, framing included.
pub const MAX_AGGREGATE_SIZE: usize = 1024 * 1024;

// AggregatedRecord fields.
const PARTITION_KEY_TABLE: u32 = 1;
const RECORDS: u32 = 3;
// Record fields.
const PARTITION_KEY_INDEX: u32 = 1;
const DATA: u32 = 3;

/// One Kinesis record and the positions of the user records it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Packed {
    pub data: Vec<u8>,
    pub members: Range<usize>,
}

struct Builder {
    body: Vec<u8>,
    start: usize,
    count: usize,
}

impl Builder {
    fn new(partition_key: &str, start: usize) -> Result<Self, DispatchError> {
        let body = encode(|os| os.write_string(PARTITION_KEY_TABLE, partition_key))?;
        Ok(Self {
            body,
            start,
            count: 0,
        })
    }

    fn fits(&self, entry_len: usize) -> bool {
        MAGIC.len() + self.body.len() + entry_len + DIGEST_LEN <= MAX_AGGREGATE_SIZE
    }

    fn push(&mut self, entry: &[u8]) {
        self.body.extend_from_slice(entry);
        self.count += 1;
    }

    fn finish(self) -> Packed {
        let digest = md5::compute(&self.body);
        let mut data = Vec::with_capacity(MAGIC.len() + self.body.len() + DIGEST_LEN);
        data.extend_from_slice(&MAGIC);
        data.extend_from_slice(&self.body);
        data.extend_from_slice(&digest.0);
        Packed {
            data,
            members: self.start..self.start + self.count,
        }
    }
}

/// Packs `records` in order into as few aggregated records as the size limit
/// allows. A record is never split across two aggregates.
pub fn pack(partition_key: &str, records: &[Vec<u8>]) -> Result<Vec<Packed>, DispatchError> {
    let mut packed = Vec::new();
    let mut builder = Builder::new(partition_key, 0)?;

    for (i, record) in records.iter().enumerate() {
        let entry = encode_entry(record)?;
        if builder.count > 0 && !builder.fits(entry.len()) {
            packed.push(builder.finish());
            builder = Builder::new(partition_key, i)?;
        }
        builder.push(&entry);
    }

    if builder.count > 0 {
        packed.push(builder.finish());
    }
    Ok(packed)
}

/// Field 3 of `AggregatedRecord`: one length-delimited `Record`.
fn encode_entry(record: &[u8]) -> Result<Vec<u8>, DispatchError> {
    let inner = encode(|os| {
        os.write_uint64(PARTITION_KEY_INDEX, 0)?;
        os.write_bytes(DATA, record)
    })?;
    encode(|os| os.write_bytes(RECORDS, &inner))
}

fn encode(
    write: impl FnOnce(&mut CodedOutputStream<'_>) -> protobuf::Result<()>,
) -> Result<Vec<u8>, DispatchError> {
    let mut buf = Vec::new();
    {
        let mut os = CodedOutputStream::vec(&mut buf);
        write(&mut os)
            .and_then(|()| os.flush())
            .map_err(|e| DispatchError::Provider(format!("encoding aggregated record: {e}")))?;
    }
    Ok(buf)
}

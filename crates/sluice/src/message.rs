// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The unit of data handled by transforms.
//!
//! A message carries raw data bytes and opaque metadata bytes. Either can be
//! addressed as a JSON document through dot-separated paths (`a.b.0.c`); a
//! path prefixed with `meta ` addresses the metadata instead of the data.
//!
//! Control messages carry nothing. They tell stateful transforms to flush.

use serde_json::{Map, Value as Json};
use std::fmt;

use crate::errors::MessageError;

const META_PREFIX: &str = "meta ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    data: Vec<u8>,
    meta: Vec<u8>,
    control: bool,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn control() -> Self {
        Self {
            control: true,
            ..Self::default()
        }
    }

    pub fn is_control(&self) -> bool {
        self.control
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// No-op on control messages.
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        if !self.control {
            self.data = data.into();
        }
        self
    }

    pub fn metadata(&self) -> &[u8] {
        &self.meta
    }

    /// No-op on control messages.
    pub fn set_metadata(&mut self, meta: impl Into<Vec<u8>>) -> &mut Self {
        if !self.control {
            self.meta = meta.into();
        }
        self
    }

    /// Looks up `path` in the data (or metadata) document.
    ///
    /// Missing paths, empty paths and non-JSON documents yield an empty value.
    pub fn get_value(&self, path: &str) -> Value {
        let (doc, path) = self.target(path);
        let path = path.trim();
        if path.is_empty() || doc.is_empty() {
            return Value(None);
        }

        let Ok(root) = serde_json::from_slice::<Json>(doc) else {
            return Value(None);
        };

        let mut current = &root;
        for segment in path.split('.') {
            let next = match current {
                Json::Object(map) => map.get(segment),
                Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(v) => current = v,
                None => return Value(None),
            }
        }

        Value(Some(current.clone()))
    }

    /// Writes `value` at `path`, creating intermediate objects as needed.
    ///
    /// An empty document becomes a new object. The array segment `-1` appends.
    pub fn set_value(&mut self, path: &str, value: Json) -> Result<(), MessageError> {
        if self.control {
            return Ok(());
        }

        let is_meta = path.starts_with(META_PREFIX);
        let (doc, trimmed) = self.target(path);
        let trimmed = trimmed.trim().to_string();
        if trimmed.is_empty() {
            return Err(MessageError::EmptyPath {
                path: path.to_string(),
            });
        }

        let mut root = if doc.is_empty() {
            Json::Object(Map::new())
        } else {
            match serde_json::from_slice::<Json>(doc) {
                Ok(root @ (Json::Object(_) | Json::Array(_))) => root,
                _ => {
                    return Err(MessageError::NotJson {
                        path: path.to_string(),
                    })
                }
            }
        };

        let segments: Vec<&str> = trimmed.split('.').collect();
        set_path(&mut root, &segments, value);

        // Serializing a Value cannot fail: every map key is a string.
        let bytes = serde_json::to_vec(&root).unwrap_or_default();
        if is_meta {
            self.meta = bytes;
        } else {
            self.data = bytes;
        }
        Ok(())
    }

    fn target<'a>(&'a self, path: &'a str) -> (&'a [u8], &'a str) {
        match path.strip_prefix(META_PREFIX) {
            Some(rest) => (&self.meta, rest),
            None => (&self.data, path),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

fn set_path(node: &mut Json, segments: &[&str], value: Json) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if let Json::Array(items) = node {
        if *head == "-1" {
            let mut child = Json::Null;
            set_path(&mut child, rest, value);
            items.push(child);
            return;
        }
        if let Ok(index) = head.parse::<usize>() {
            while items.len() <= index {
                items.push(Json::Null);
            }
            set_path(&mut items[index], rest, value);
            return;
        }
    }

    if !node.is_object() {
        *node = Json::Object(Map::new());
    }
    if let Json::Object(map) = node {
        let child = map.entry(head.to_string()).or_insert(Json::Null);
        set_path(child, rest, value);
    }
}

/// Result of a path lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Value(Option<Json>);

impl Value {
    pub fn exists(&self) -> bool {
        self.0.is_some()
    }

    pub fn as_json(&self) -> Option<&Json> {
        self.0.as_ref()
    }

    /// Raw bytes: string contents for strings, JSON text for everything else.
    pub fn bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => Ok(()),
            Some(Json::String(s)) => f.write_str(s),
            Some(other) => write!(f, "{other}"),
        }
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Composable message transforms with keyed batching and batch delivery.
//!
//! A pipeline is an ordered list of [`transform::Transformer`] stages run by
//! [`transform::apply`]. Stateful stages buffer data messages in an
//! [`aggregate::Aggregator`] and flush when a limit is hit or when a control
//! message reaches them, so every input batch ends with exactly one control
//! message that drains every open buffer on its way through the chain.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregate;
pub mod config;
pub mod errors;
pub mod message;
pub mod send;
pub mod transform;

pub use errors::{DispatchError, Error, Result};
pub use message::Message;
pub use transform::{apply, Context, Transformer};

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

use crate::config::Aws;

/// Loads the default credential chain, pinned to the region of `aws` if it
/// names one.
pub async fn sdk_config(aws: &Aws) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = aws.region() {
        debug!("Using AWS region {region}");
        loader = loader.region(Region::new(region));
    }
    loader.load().await
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;

const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug)]
pub struct Config {
    /// JSON file listing the transforms to run.
    pub pipeline_path: PathBuf,
    /// Input lines per `apply` call; each call ends with a control record.
    pub batch_size: usize,
    pub log_level: String,
}

impl Config {
    /// Reads the pipeline path from the first argument, falling back to
    /// `SLUICE_CONFIG`. Everything else comes from the environment.
    pub fn new(mut args: impl Iterator<Item = String>) -> anyhow::Result<Config> {
        let pipeline_path = args
            .next()
            .or_else(|| env::var("SLUICE_CONFIG").ok())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                anyhow::anyhow!("No pipeline configuration given: pass a path or set SLUICE_CONFIG")
            })?;

        let batch_size = env::var("SLUICE_BATCH_SIZE")
            .ok()
            .and_then(|size| size.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let log_level = env::var("SLUICE_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or("info".to_string());

        Ok(Config {
            pipeline_path,
            batch_size,
            log_level,
        })
    }
}

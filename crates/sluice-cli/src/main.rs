// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use sluice::config::PipelineConfig;
use sluice::transform::new_chain;
use sluice::{apply, Context, Message, Transformer};

mod config;

#[tokio::main]
pub async fn main() {
    let config = match config::Config::new(env::args().skip(1)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,aws_smithy_runtime=off,aws_config=off,{}",
        config.log_level
    );

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if let Err(e) = run(config).await {
        error!("Pipeline failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(config: config::Config) -> anyhow::Result<()> {
    let pipeline = PipelineConfig::from_file(&config.pipeline_path)?;
    let chain = new_chain(&pipeline.transforms).await?;
    info!(
        "Loaded {} transforms from {}",
        chain.len(),
        config.pipeline_path.display()
    );

    let cancel = CancellationToken::new();
    let ctx = Context::with_cancellation(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, flushing buffered records");
            cancel.cancel();
        }
    });

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    let mut batch = Vec::with_capacity(config.batch_size);
    let mut total = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = ctx.cancellation_token().cancelled() => None,
        };
        let Some(line) = line else {
            break;
        };

        batch.push(Message::with_data(line));
        if batch.len() >= config.batch_size {
            total += batch.len();
            run_batch(&ctx, &chain, std::mem::take(&mut batch), &mut stdout).await?;
        }
    }

    // Data records are refused once cancelled; the control record still
    // drains whatever the stages already buffered.
    if ctx.is_cancelled() && !batch.is_empty() {
        warn!("Discarding {} unprocessed records after interrupt", batch.len());
        batch.clear();
    }

    // Runs even when nothing is pending so stages that buffer across calls
    // still see a final control record.
    total += batch.len();
    run_batch(&ctx, &chain, batch, &mut stdout).await?;

    for tf in &chain {
        tf.close(&ctx).await?;
    }
    info!("Processed {total} records");
    Ok(())
}

async fn run_batch(
    ctx: &Context,
    chain: &[Arc<dyn Transformer>],
    mut batch: Vec<Message>,
    stdout: &mut io::Stdout,
) -> anyhow::Result<()> {
    batch.push(Message::control());

    for msg in apply(ctx, chain, batch).await? {
        if msg.is_control() {
            continue;
        }
        stdout.write_all(msg.data()).await?;
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    Ok(())
}

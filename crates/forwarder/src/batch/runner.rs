// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::batch::{queue, BatchError, BatchHandler, BatchQueue, BufferPool, QueueConfig};
use crate::constants::{DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RECORD_SIZE};
use crate::decoders::Decoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Serialized records above this size are dropped.
    pub max_record_size: usize,
    pub max_batch_size: usize,
    /// Number of consumers delivering batches concurrently.
    pub max_concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Drains a decoder into a handler through a batch queue.
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
    pool: BufferPool,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Runner {
            config,
            pool: BufferPool::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs one producer and `max_concurrency` consumers until the decoder is exhausted
    /// and every batch is handled. The first failure cancels every participant and is
    /// the error returned.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        decoder: Decoder,
        handler: Arc<dyn BatchHandler>,
    ) -> Result<(), BatchError> {
        let cancel = cancel.child_token();
        let concurrency = self.config.max_concurrency.max(1);
        let (queue, receiver) = queue(
            QueueConfig {
                max_batch_size: self.config.max_batch_size,
                capacity: 2 * concurrency,
            },
            self.pool.clone(),
            cancel.clone(),
        );

        let mut tasks = JoinSet::new();
        for _ in 0..concurrency {
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);
            tasks.spawn(async move { receiver.process(handler.as_ref()).await });
        }
        drop(receiver);
        tasks.spawn(produce(decoder, queue, self.config.max_record_size));

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|err| Err(BatchError::Task(err.to_string())));
            if let Err(err) = result {
                if first_err.is_none() {
                    cancel.cancel();
                    // in flight deliveries do not observe the token
                    tasks.abort_all();
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn produce(
    decoder: Decoder,
    mut queue: BatchQueue,
    max_record_size: usize,
) -> Result<(), BatchError> {
    let mut record_buf = Vec::new();
    let (mut pushed, mut dropped) = (0usize, 0usize);
    for record in decoder {
        // push only observes the token when it flushes
        if queue.is_cancelled() {
            return Err(BatchError::Cancelled);
        }
        let record = record?;
        record_buf.clear();
        serde_json::to_writer(&mut record_buf, &record)?;
        if record_buf.len() > max_record_size {
            debug!(
                "dropping record of {} bytes, max record size is {max_record_size}",
                record_buf.len()
            );
            dropped += 1;
            continue;
        }
        queue.push(&record_buf).await?;
        pushed += 1;
    }
    queue.close().await?;
    debug!("pushed {pushed} records, dropped {dropped}");
    Ok(())
}

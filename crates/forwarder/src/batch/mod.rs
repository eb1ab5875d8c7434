// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Size bounded batching of decoded records.
//!
//! A single producer serializes records into newline delimited batches pushed on a
//! [`BatchQueue`]; consumers pop them from a shared [`BatchReceiver`] and hand them to
//! a [`BatchHandler`]. The [`Runner`] wires a decoder, a queue and a pool of consumers
//! together.

use async_trait::async_trait;

use crate::decoders::DecodeError;
use crate::http::DeliveryError;

mod pool;
mod queue;
mod runner;

pub use pool::{Batch, BufferPool};
pub use queue::{queue, BatchQueue, BatchReceiver, QueueConfig};
pub use runner::{Runner, RunnerConfig};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("record length {len} exceeds max batch size {max_batch_size}")]
    RecordLenExceedsBatchSize { len: usize, max_batch_size: usize },
    #[error("batch processing cancelled")]
    Cancelled,
    #[error("batch queue closed")]
    Closed,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("batch task failed: {0}")]
    Task(String),
}

/// Receives every batch popped by a consumer.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: &[u8]) -> Result<(), DeliveryError>;
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::mem;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::batch::{Batch, BatchError, BatchHandler, BufferPool};
use crate::constants::RECORD_DELIMITER;

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Upper bound of a batch in bytes, delimiters included.
    pub max_batch_size: usize,
    /// Batches waiting for a consumer before `push` blocks.
    pub capacity: usize,
}

/// Builds a queue and the receiver draining it. Both observe `cancel`.
pub fn queue(
    config: QueueConfig,
    pool: BufferPool,
    cancel: CancellationToken,
) -> (BatchQueue, BatchReceiver) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let queue = BatchQueue {
        buffer: pool.get(config.max_batch_size),
        max_batch_size: config.max_batch_size,
        tx,
        pool,
        cancel: cancel.clone(),
    };
    let receiver = BatchReceiver {
        rx: Arc::new(Mutex::new(rx)),
        cancel,
    };
    (queue, receiver)
}

/// Producer side. Dropping the queue without [`BatchQueue::close`] discards the
/// pending buffer.
#[derive(Debug)]
pub struct BatchQueue {
    buffer: Vec<u8>,
    max_batch_size: usize,
    tx: mpsc::Sender<Batch>,
    pool: BufferPool,
    cancel: CancellationToken,
}

impl BatchQueue {
    /// Appends `record` and a delimiter, flushing the pending batch first when the
    /// record would not fit.
    pub async fn push(&mut self, record: &[u8]) -> Result<(), BatchError> {
        let len = record.len() + 1;
        if len > self.max_batch_size {
            return Err(BatchError::RecordLenExceedsBatchSize {
                len,
                max_batch_size: self.max_batch_size,
            });
        }
        if self.buffer.len() + len > self.max_batch_size {
            self.flush().await?;
        }
        self.buffer.extend_from_slice(record);
        self.buffer.push(RECORD_DELIMITER);
        Ok(())
    }

    /// Hands the pending batch to the consumers, waiting for room if needed.
    pub async fn flush(&mut self) -> Result<(), BatchError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = mem::replace(&mut self.buffer, self.pool.get(self.max_batch_size));
        debug!("flushing batch of {} bytes", data.len());
        let batch = self.pool.batch(self.max_batch_size, data);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(BatchError::Cancelled),
            sent = self.tx.send(batch) => sent.map_err(|_| BatchError::Closed),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Flushes what is left and closes the queue. Receivers drain the remaining batches
    /// and stop.
    pub async fn close(mut self) -> Result<(), BatchError> {
        self.flush().await
    }
}

/// Consumer side, shared by every consumer of a queue.
#[derive(Debug, Clone)]
pub struct BatchReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
    cancel: CancellationToken,
}

impl BatchReceiver {
    /// Pops the next batch. `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Result<Option<Batch>, BatchError> {
        let mut rx = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(BatchError::Cancelled),
            rx = self.rx.lock() => rx,
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(BatchError::Cancelled),
            batch = rx.recv() => Ok(batch),
        }
    }

    /// Hands every batch to `handler` until the queue is closed. Each batch returns to
    /// its pool once handled.
    pub async fn process<H: BatchHandler + ?Sized>(&self, handler: &H) -> Result<(), BatchError> {
        while let Some(batch) = self.recv().await? {
            handler.handle(&batch).await?;
        }
        Ok(())
    }
}

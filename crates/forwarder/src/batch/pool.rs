// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::mem;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

/// Reusable batch buffers, keyed by the capacity they were allocated with.
#[derive(Debug, Clone, Default)]
pub struct BufferPool {
    idle: Arc<Mutex<HashMap<usize, Vec<Vec<u8>>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes an empty buffer for batches of up to `capacity` bytes. Fresh buffers grow
    /// on demand, reused ones keep the allocation of their previous batch.
    pub fn get(&self, capacity: usize) -> Vec<u8> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        idle.get_mut(&capacity)
            .and_then(Vec::pop)
            .unwrap_or_default()
    }

    fn put(&self, capacity: usize, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        idle.entry(capacity).or_default().push(buffer);
    }

    /// Number of idle buffers held for `capacity`.
    pub fn idle(&self, capacity: usize) -> usize {
        let idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        idle.get(&capacity).map_or(0, Vec::len)
    }

    pub(crate) fn batch(&self, capacity: usize, data: Vec<u8>) -> Batch {
        Batch {
            data,
            capacity,
            pool: self.clone(),
        }
    }
}

/// Newline delimited records owned by a single consumer. The buffer goes back to its
/// pool when the batch is dropped.
#[derive(Debug)]
pub struct Batch {
    data: Vec<u8>,
    capacity: usize,
    pool: BufferPool,
}

impl Batch {
    pub fn records(&self) -> impl Iterator<Item = &[u8]> {
        self.data
            .split(|byte| *byte == crate::constants::RECORD_DELIMITER)
            .filter(|record| !record.is_empty())
    }
}

impl Deref for Batch {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.pool.put(self.capacity, mem::take(&mut self.data));
    }
}

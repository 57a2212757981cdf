// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded single-producer/single-consumer queue of ready-to-play PCM.
//!
//! Overflow policy is drop-oldest: a push into a full queue evicts exactly
//! one stale chunk and always succeeds. The consumer side never blocks; if
//! the producer happens to hold the lock the consumer sees an empty queue
//! for that callback and plays silence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

#[derive(Debug)]
pub struct PlaybackQueue {
    capacity: usize,
    chunks: Mutex<VecDeque<Vec<i16>>>,
    dropped: AtomicU64,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            chunks: Mutex::new(VecDeque::with_capacity(capacity)),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<i16>>> {
        self.chunks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a chunk, returning the evicted oldest chunk if the queue was full.
    pub fn push(&self, chunk: Vec<i16>) -> Option<Vec<i16>> {
        let mut chunks = self.lock();
        let evicted = if chunks.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            chunks.pop_front()
        } else {
            None
        };
        chunks.push_back(chunk);
        evicted
    }

    /// Non-blocking pop. Returns `None` when empty or momentarily contended.
    pub fn try_pop(&self) -> Option<Vec<i16>> {
        match self.chunks.try_lock() {
            Ok(mut chunks) => chunks.pop_front(),
            Err(TryLockError::Poisoned(e)) => e.into_inner().pop_front(),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Fill an output buffer from the next chunk, zero-padding the remainder.
    ///
    /// Returns the number of samples copied from the queue; `0` means the
    /// whole buffer is silence. A chunk longer than `out` is truncated.
    pub fn fill(&self, out: &mut [i16]) -> usize {
        let Some(chunk) = self.try_pop() else {
            out.fill(0);
            return 0;
        };
        let n = chunk.len().min(out.len());
        out[..n].copy_from_slice(&chunk[..n]);
        out[n..].fill(0);
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total chunks evicted by overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

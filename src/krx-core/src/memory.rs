// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Quick cyclic tuning memory.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::radio::mode::RadioMode;

pub const DEFAULT_MEMORY_SLOTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySlot {
    pub freq_khz: f64,
    pub mode: RadioMode,
    pub delta_low_hz: i32,
    pub delta_high_hz: i32,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    capacity: usize,
    slots: VecDeque<MemorySlot>,
    cursor: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SLOTS)
    }
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: VecDeque::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Store a tuple, overwriting the oldest slot once full.
    pub fn write(&mut self, freq_khz: f64, mode: RadioMode, delta_low_hz: i32, delta_high_hz: i32) {
        if self.slots.len() >= self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(MemorySlot {
            freq_khz: (freq_khz * 1000.0).round() / 1000.0,
            mode,
            delta_low_hz,
            delta_high_hz,
        });
    }

    pub fn recall(&self, index: usize) -> Option<MemorySlot> {
        self.slots.get(index).copied()
    }

    /// Step to the next slot, wrapping around.
    pub fn recall_next(&mut self) -> Option<MemorySlot> {
        if self.slots.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.slots.get(self.cursor).copied()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slots(&self) -> impl Iterator<Item = &MemorySlot> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_rounds_frequency() {
        let mut mem = MemoryStore::default();
        mem.write(14_074.123_456, RadioMode::USB, 0, 0);
        assert_eq!(mem.recall(0).unwrap().freq_khz, 14_074.123);
    }

    #[test]
    fn test_recall_out_of_range() {
        let mut mem = MemoryStore::default();
        assert!(mem.recall(0).is_none());
        mem.write(7_030.0, RadioMode::CW, 0, 0);
        assert!(mem.recall(1).is_none());
    }

    #[test]
    fn test_oldest_overwritten_past_capacity() {
        let mut mem = MemoryStore::new(3);
        for i in 0..5 {
            mem.write(1000.0 + i as f64, RadioMode::AM, 0, 0);
        }
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.recall(0).unwrap().freq_khz, 1002.0);
        assert_eq!(mem.recall(2).unwrap().freq_khz, 1004.0);
    }

    #[test]
    fn test_recall_next_cycles() {
        let mut mem = MemoryStore::default();
        assert!(mem.recall_next().is_none());
        mem.write(1.0, RadioMode::USB, 0, 0);
        mem.write(2.0, RadioMode::LSB, 10, -10);
        assert_eq!(mem.recall_next().unwrap().freq_khz, 2.0);
        assert_eq!(mem.recall_next().unwrap().freq_khz, 1.0);
        assert_eq!(mem.recall_next().unwrap().freq_khz, 2.0);
        mem.clear();
        assert!(mem.is_empty());
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::VecDeque;

/// One decoded waterfall row of colour indices.
pub type SpectrumRow = Vec<u8>;

pub const DEFAULT_HISTORY_ROWS: usize = 3;

/// Arithmetic mean over N consecutive raw rows.
///
/// A depth change only takes effect at the start of the next cycle so a
/// partially accumulated average is never mixed.
#[derive(Debug, Clone)]
pub struct Averager {
    depth: usize,
    pending_depth: usize,
    acc: Vec<f32>,
    count: usize,
}

impl Default for Averager {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Averager {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            pending_depth: depth,
            acc: Vec::new(),
            count: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.pending_depth = depth.max(1);
    }

    /// Feed one raw row; yields the mean once `depth` rows were collected.
    pub fn push(&mut self, row: &[u8]) -> Option<Vec<f32>> {
        if self.count == 0 {
            self.depth = self.pending_depth;
            self.acc.clear();
            self.acc.resize(row.len(), 0.0);
        } else if self.acc.len() != row.len() {
            // Bin count changed mid-cycle; restart.
            self.count = 0;
            return self.push(row);
        }

        for (a, v) in self.acc.iter_mut().zip(row) {
            *a += *v as f32;
        }
        self.count += 1;

        if self.count < self.depth {
            return None;
        }
        let n = self.count as f32;
        self.count = 0;
        Some(self.acc.iter().map(|a| a / n).collect())
    }
}

/// Fixed-depth history of decoded rows, newest last.
#[derive(Debug, Clone)]
pub struct RowHistory {
    capacity: usize,
    rows: VecDeque<SpectrumRow>,
}

impl Default for RowHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_ROWS)
    }
}

impl RowHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            rows: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: SpectrumRow) {
        if self.rows.len() >= self.capacity {
            self.rows.pop_front();
        }
        self.rows.push_back(row);
    }

    pub fn latest(&self) -> Option<&SpectrumRow> {
        self.rows.back()
    }

    /// Rows from newest to oldest.
    pub fn iter_newest(&self) -> impl Iterator<Item = &SpectrumRow> {
        self.rows.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_one_passes_through() {
        let mut avg = Averager::default();
        assert_eq!(avg.push(&[1, 2, 3]), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_mean_over_depth() {
        let mut avg = Averager::new(3);
        assert!(avg.push(&[0, 10]).is_none());
        assert!(avg.push(&[3, 20]).is_none());
        assert_eq!(avg.push(&[6, 30]), Some(vec![3.0, 20.0]));
        assert!(avg.push(&[0, 0]).is_none());
    }

    #[test]
    fn test_depth_change_waits_for_cycle() {
        let mut avg = Averager::new(2);
        assert!(avg.push(&[2]).is_none());
        avg.set_depth(1);
        assert_eq!(avg.depth(), 2);
        assert_eq!(avg.push(&[4]), Some(vec![3.0]));
        assert_eq!(avg.push(&[7]), Some(vec![7.0]));
        assert_eq!(avg.depth(), 1);
    }

    #[test]
    fn test_length_change_restarts_cycle() {
        let mut avg = Averager::new(2);
        assert!(avg.push(&[1, 1]).is_none());
        assert!(avg.push(&[5, 5, 5]).is_none());
        assert_eq!(avg.push(&[7, 7, 7]), Some(vec![6.0, 6.0, 6.0]));
    }

    #[test]
    fn test_history_keeps_newest() {
        let mut hist = RowHistory::default();
        for i in 0..5u8 {
            hist.push(vec![i]);
        }
        assert_eq!(hist.len(), 3);
        assert_eq!(hist.latest(), Some(&vec![4]));
        let order: Vec<u8> = hist.iter_newest().map(|r| r[0]).collect();
        assert_eq!(order, vec![4, 3, 2]);
    }
}

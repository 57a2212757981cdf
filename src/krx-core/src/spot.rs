// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Time-decayed, deduplicated table of DX cluster spots.
//!
//! Spots are keyed by a locally minted identifier rather than the callsign so
//! repeated spots of one station coexist until visibility is recomputed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Interval between keepalive + expiry passes.
pub const CLEANUP_INTERVAL_SECS: i64 = 120;
/// Interval between visibility recomputations.
pub const UPDATE_INTERVAL_SECS: i64 = 10;
/// Base age step used for colouring and TTL.
pub const SPOT_TTL_BASE_SECS: i64 = 600;
pub const SPOT_TTL_SECS: i64 = 5 * SPOT_TTL_BASE_SECS;

pub type SpotId = u64;

static NEXT_SPOT_ID: AtomicU64 = AtomicU64::new(1);

fn mint_spot_id() -> SpotId {
    NEXT_SPOT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    pub callsign: String,
    pub spotter: String,
    pub freq_khz: f64,
    pub timestamp: DateTime<Utc>,
    pub raw_fields: Vec<String>,
}

/// Age class of a spot, one step per [`SPOT_TTL_BASE_SECS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpotAge {
    Fresh,
    Aging,
    Old,
    Stale,
    Expiring,
}

impl Spot {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    pub fn age_class(&self, now: DateTime<Utc>) -> SpotAge {
        match self.age(now).num_seconds() / SPOT_TTL_BASE_SECS {
            i64::MIN..=0 => SpotAge::Fresh,
            1 => SpotAge::Aging,
            2 => SpotAge::Old,
            3 => SpotAge::Stale,
            _ => SpotAge::Expiring,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotTable {
    spots: BTreeMap<SpotId, Spot>,
    visible: Vec<SpotId>,
    ttl: Duration,
}

impl Default for SpotTable {
    fn default() -> Self {
        Self::new(Duration::seconds(SPOT_TTL_SECS))
    }
}

impl SpotTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            spots: BTreeMap::new(),
            visible: Vec::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&mut self, spot: Spot) -> SpotId {
        let id = mint_spot_id();
        self.spots.insert(id, spot);
        id
    }

    pub fn get(&self, id: SpotId) -> Option<&Spot> {
        self.spots.get(&id)
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// Drop every spot older than the TTL. Returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let before = self.spots.len();
        self.spots.retain(|_, spot| spot.age(now) <= ttl);
        let spots = &self.spots;
        self.visible.retain(|id| spots.contains_key(id));
        before - self.spots.len()
    }

    /// Recompute the spots strictly inside `(start_khz, end_khz)`, sorted by
    /// frequency. Older duplicates of a visible callsign are deleted from the
    /// table, not just hidden.
    pub fn recompute_visible(&mut self, start_khz: f64, end_khz: f64) -> &[SpotId] {
        let mut by_call: HashMap<&str, Vec<SpotId>> = HashMap::new();
        for (id, spot) in &self.spots {
            if start_khz < spot.freq_khz && spot.freq_khz < end_khz {
                by_call.entry(spot.callsign.as_str()).or_default().push(*id);
            }
        }

        let mut stale = Vec::new();
        let mut visible = Vec::new();
        for ids in by_call.values() {
            let newest = ids
                .iter()
                .copied()
                .max_by_key(|id| (self.spots[id].timestamp, *id));
            for id in ids {
                if Some(*id) == newest {
                    visible.push(*id);
                } else {
                    stale.push(*id);
                }
            }
        }

        for id in stale {
            self.spots.remove(&id);
        }
        visible.sort_by(|a, b| self.spots[a].freq_khz.total_cmp(&self.spots[b].freq_khz));
        self.visible = visible;
        &self.visible
    }

    pub fn visible_ids(&self) -> &[SpotId] {
        &self.visible
    }

    /// Snapshot of the currently visible spots, ordered by frequency.
    pub fn visible_spots(&self) -> Vec<(SpotId, Spot)> {
        self.visible
            .iter()
            .filter_map(|id| self.spots.get(id).map(|s| (*id, s.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn spot(call: &str, freq: f64, secs: i64) -> Spot {
        Spot {
            callsign: call.to_string(),
            spotter: "N0CALL".to_string(),
            freq_khz: freq,
            timestamp: at(secs),
            raw_fields: Vec::new(),
        }
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let mut table = SpotTable::default();
        let a = table.insert(spot("K1ABC", 14_020.0, 0));
        let b = table.insert(spot("K1ABC", 14_020.0, 0));
        assert!(b > a);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_callsign_keeps_most_recent() {
        let mut table = SpotTable::default();
        let _a = table.insert(spot("DL1XYZ", 14_010.0, 0));
        let b = table.insert(spot("DL1XYZ", 14_012.0, 60));
        let visible = table.recompute_visible(14_000.0, 14_350.0).to_vec();
        assert_eq!(visible, vec![b]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(b).unwrap().freq_khz, 14_012.0);
    }

    #[test]
    fn test_visible_sorted_and_window_exclusive() {
        let mut table = SpotTable::default();
        let hi = table.insert(spot("A1A", 14_300.0, 0));
        let lo = table.insert(spot("B2B", 14_050.0, 0));
        let _edge = table.insert(spot("C3C", 14_000.0, 0));
        let _out = table.insert(spot("D4D", 7_050.0, 0));
        let visible = table.recompute_visible(14_000.0, 14_350.0).to_vec();
        assert_eq!(visible, vec![lo, hi]);
        // Outside spots stay in the table.
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_dedup_only_applies_to_visible_spots() {
        let mut table = SpotTable::default();
        table.insert(spot("K9QQ", 7_010.0, 0));
        table.insert(spot("K9QQ", 14_010.0, 30));
        let visible = table.recompute_visible(14_000.0, 14_350.0).to_vec();
        assert_eq!(visible.len(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_ttl_purge_boundary() {
        let mut table = SpotTable::default();
        let old = table.insert(spot("OLD", 14_001.0, 0));
        let young = table.insert(spot("YOUNG", 14_002.0, 2));
        let now = at(SPOT_TTL_SECS + 1);
        assert_eq!(table.purge_expired(now), 1);
        assert!(table.get(old).is_none());
        assert!(table.get(young).is_some());
    }

    #[test]
    fn test_age_classes() {
        let s = spot("X", 14_000.0, 0);
        assert_eq!(s.age_class(at(10)), SpotAge::Fresh);
        assert_eq!(s.age_class(at(700)), SpotAge::Aging);
        assert_eq!(s.age_class(at(1300)), SpotAge::Old);
        assert_eq!(s.age_class(at(1900)), SpotAge::Stale);
        assert_eq!(s.age_class(at(2500)), SpotAge::Expiring);
    }
}

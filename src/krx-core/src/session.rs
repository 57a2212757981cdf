// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Caller-owned session state shared by the streams of one server session.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::radio::mode::RadioMode;
use crate::rig::RigState;

/// Audio streams reuse the waterfall's handshake timestamp if it is at most
/// this many seconds old, so the server groups both under one session.
pub const SESSION_REUSE_WINDOW_SECS: u64 = 5;

/// CW receive offset applied when following a transceiver's dial.
pub const CW_PITCH_KHZ: f64 = 0.6;

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Handshake timestamp shared between the waterfall and audio streams.
#[derive(Debug, Default)]
pub struct SessionClock {
    stamp: Mutex<Option<u64>>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh timestamp (waterfall connect).
    pub fn mint(&self, now: u64) -> u64 {
        let mut stamp = self.stamp.lock().unwrap_or_else(|e| e.into_inner());
        *stamp = Some(now);
        now
    }

    /// Reuse the current timestamp if recent enough, otherwise mint a new one.
    pub fn reuse_or_mint(&self, now: u64) -> u64 {
        let mut stamp = self.stamp.lock().unwrap_or_else(|e| e.into_inner());
        match *stamp {
            Some(ts) if now.saturating_sub(ts) <= SESSION_REUSE_WINDOW_SECS => ts,
            _ => {
                *stamp = Some(now);
                now
            }
        }
    }

    pub fn current(&self) -> Option<u64> {
        *self.stamp.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Link toggles between the waterfall, the receiver audio and the CAT rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFlags {
    /// Waterfall follows the transceiver dial.
    pub wf_cat_link: bool,
    /// Waterfall recentres whenever the receiver is retuned.
    pub wf_snd_link: bool,
    /// Receiver audio follows the transceiver frequency and mode.
    pub cat_snd_link: bool,
    /// Pick the sideband automatically from the tuned frequency.
    pub auto_mode: bool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            wf_cat_link: false,
            wf_snd_link: true,
            cat_snd_link: false,
            auto_mode: true,
        }
    }
}

/// Actions the caller should apply after a CAT poll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SyncPlan {
    /// Retune the receiver audio to `(freq_khz, mode)`.
    pub audio: Option<(f64, RadioMode)>,
    /// Recentre the waterfall on this frequency.
    pub waterfall_center_khz: Option<f64>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.waterfall_center_khz.is_none()
    }
}

/// Tracks the last transceiver state applied so only changes propagate.
#[derive(Debug, Clone, Default)]
pub struct CatSync {
    last_freq_khz: Option<f64>,
    last_mode: Option<RadioMode>,
}

impl CatSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(
        &mut self,
        flags: &SessionFlags,
        rig: &RigState,
        audio_freq_khz: f64,
        audio_mode: RadioMode,
    ) -> SyncPlan {
        let mut plan = SyncPlan::default();
        if !rig.link_healthy {
            return plan;
        }

        let mut mode = audio_mode;
        let mut mode_changed = false;
        if flags.cat_snd_link && self.last_mode != Some(rig.mode) {
            self.last_mode = Some(rig.mode);
            mode_changed = rig.mode != audio_mode;
            mode = rig.mode;
        }

        if let Some(freq) = rig.freq_khz {
            if self.last_freq_khz != Some(freq) {
                self.last_freq_khz = Some(freq);
                if flags.cat_snd_link {
                    let tuned = if mode == RadioMode::CW {
                        freq - CW_PITCH_KHZ
                    } else {
                        freq
                    };
                    plan.audio = Some((tuned, mode));
                }
                if flags.wf_cat_link || (flags.wf_snd_link && flags.cat_snd_link) {
                    plan.waterfall_center_khz = Some(freq);
                }
            }
        }

        if mode_changed && plan.audio.is_none() {
            plan.audio = Some((audio_freq_khz, mode));
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::Vfo;

    fn rig(freq: f64, mode: RadioMode) -> RigState {
        RigState {
            freq_khz: Some(freq),
            mode,
            vfo: Vfo::A,
            ptt_active: false,
            link_healthy: true,
        }
    }

    #[test]
    fn test_clock_reuses_recent_stamp() {
        let clock = SessionClock::new();
        assert_eq!(clock.mint(1_000), 1_000);
        assert_eq!(clock.reuse_or_mint(1_005), 1_000);
        assert_eq!(clock.reuse_or_mint(1_006), 1_006);
        assert_eq!(clock.current(), Some(1_006));
    }

    #[test]
    fn test_clock_mints_when_empty() {
        let clock = SessionClock::new();
        assert_eq!(clock.reuse_or_mint(42), 42);
    }

    #[test]
    fn test_sync_follows_rig_when_linked() {
        let flags = SessionFlags {
            cat_snd_link: true,
            ..SessionFlags::default()
        };
        let mut sync = CatSync::new();
        let plan = sync.plan(&flags, &rig(14_200.0, RadioMode::USB), 7_000.0, RadioMode::LSB);
        assert_eq!(plan.audio, Some((14_200.0, RadioMode::USB)));
        assert_eq!(plan.waterfall_center_khz, Some(14_200.0));

        // Same state again: nothing to do.
        let plan = sync.plan(&flags, &rig(14_200.0, RadioMode::USB), 14_200.0, RadioMode::USB);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_sync_applies_cw_pitch() {
        let flags = SessionFlags {
            cat_snd_link: true,
            wf_snd_link: false,
            ..SessionFlags::default()
        };
        let mut sync = CatSync::new();
        let plan = sync.plan(&flags, &rig(7_030.0, RadioMode::CW), 7_000.0, RadioMode::CW);
        let (freq, mode) = plan.audio.unwrap();
        assert!((freq - 7_029.4).abs() < 1e-9);
        assert_eq!(mode, RadioMode::CW);
        assert!(plan.waterfall_center_khz.is_none());
    }

    #[test]
    fn test_sync_ignores_unhealthy_link_and_unlinked_audio() {
        let mut sync = CatSync::new();
        let mut state = rig(14_200.0, RadioMode::USB);
        state.link_healthy = false;
        let flags = SessionFlags {
            cat_snd_link: true,
            ..SessionFlags::default()
        };
        assert!(sync.plan(&flags, &state, 0.0, RadioMode::USB).is_empty());

        let flags = SessionFlags {
            wf_cat_link: true,
            ..SessionFlags::default()
        };
        let plan = sync.plan(&flags, &rig(3_700.0, RadioMode::LSB), 0.0, RadioMode::USB);
        assert!(plan.audio.is_none());
        assert_eq!(plan.waterfall_center_khz, Some(3_700.0));
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Binary frames and `MSG` lines received from the SDR server.

use bytes::Buf;

use krx_core::waterfall::LimitOverrides;
use krx_core::ProtocolError;

pub const WATERFALL_TAG: &[u8; 3] = b"W/F";
pub const SOUND_TAG: &[u8; 3] = b"SND";
pub const MSG_TAG: &[u8; 3] = b"MSG";

pub const WATERFALL_HEADER_LEN: usize = 16;
pub const SOUND_HEADER_LEN: usize = 10;

/// First three bytes of a server message.
pub fn tag(payload: &[u8]) -> Option<&[u8]> {
    payload.get(..3)
}

fn expect_tag(payload: &[u8], want: &[u8; 3], min_len: usize) -> Result<(), ProtocolError> {
    if payload.len() < min_len {
        return Err(ProtocolError::TooShort {
            expected: min_len,
            actual: payload.len(),
        });
    }
    if &payload[..3] != want {
        return Err(ProtocolError::UnexpectedTag(
            String::from_utf8_lossy(&payload[..3]).into_owned(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaterfallFrame {
    pub x_bin: u32,
    pub flags_zoom: u32,
    pub sequence: u32,
    /// Compressed dB magnitude per bin.
    pub bins: Vec<u8>,
}

impl WaterfallFrame {
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        expect_tag(payload, WATERFALL_TAG, WATERFALL_HEADER_LEN)?;
        let mut header = &payload[4..WATERFALL_HEADER_LEN];
        let x_bin = header.get_u32_le();
        let flags_zoom = header.get_u32_le();
        let sequence = header.get_u32_le();
        Ok(Self {
            x_bin,
            flags_zoom,
            sequence,
            bins: payload[WATERFALL_HEADER_LEN..].to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundFrame {
    pub flags: u8,
    pub sequence: u32,
    pub smeter: u16,
    pub samples: Vec<i16>,
}

impl SoundFrame {
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        expect_tag(payload, SOUND_TAG, SOUND_HEADER_LEN)?;
        let mut buf = &payload[3..];
        let flags = buf.get_u8();
        let sequence = buf.get_u32_le();
        let smeter = buf.get_u16();
        // A trailing odd byte is not a sample.
        let mut samples = Vec::with_capacity(buf.remaining() / 2);
        while buf.remaining() >= 2 {
            samples.push(buf.get_i16_le());
        }
        Ok(Self {
            flags,
            sequence,
            smeter,
            samples,
        })
    }

    pub fn rssi_dbm(&self) -> f32 {
        0.1 * self.smeter as f32 - 127.0
    }
}

/// `MSG key=value ...` status line from the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerMessage {
    pub pairs: Vec<(String, String)>,
}

impl ServerMessage {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if tag(payload)? != MSG_TAG {
            return None;
        }
        let text = String::from_utf8_lossy(&payload[3..]);
        let pairs = text
            .split_whitespace()
            .map(|token| match token.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (token.to_string(), String::new()),
            })
            .collect();
        Some(Self { pairs })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Server-reported waterfall limits carried by this message, if any.
    pub fn limit_overrides(&self) -> LimitOverrides {
        LimitOverrides {
            max_freq_khz: self.parsed::<f64>("bandwidth").map(|hz| hz / 1000.0),
            max_zoom: self.parsed("zoom_max"),
            bins: self.parsed("wf_fft_size"),
            max_fps: self
                .parsed("wf_fps_max")
                .or_else(|| self.parsed("wf_fps")),
        }
    }

    /// `(audio_rate, true_sample_rate)` from an `audio_init` message.
    pub fn audio_rates(&self) -> Option<(u32, Option<f64>)> {
        if !self.has("audio_init") {
            return None;
        }
        let nominal = self.parsed::<u32>("audio_rate")?;
        Some((nominal, self.parsed("sample_rate")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waterfall_payload(bins: &[u8]) -> Vec<u8> {
        let mut out = b"W/F\0".to_vec();
        out.extend_from_slice(&7u32.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&42u32.to_le_bytes());
        out.extend_from_slice(bins);
        out
    }

    #[test]
    fn test_parse_waterfall_frame() {
        let frame = WaterfallFrame::parse(&waterfall_payload(&[10, 20, 30])).unwrap();
        assert_eq!(frame.x_bin, 7);
        assert_eq!(frame.flags_zoom, 8);
        assert_eq!(frame.sequence, 42);
        assert_eq!(frame.bins, vec![10, 20, 30]);
    }

    #[test]
    fn test_waterfall_frame_errors() {
        assert!(matches!(
            WaterfallFrame::parse(b"W/F\0"),
            Err(ProtocolError::TooShort { expected: 16, actual: 4 })
        ));
        let mut bad = waterfall_payload(&[1]);
        bad[..3].copy_from_slice(b"SND");
        assert!(matches!(
            WaterfallFrame::parse(&bad),
            Err(ProtocolError::UnexpectedTag(_))
        ));
    }

    #[test]
    fn test_parse_sound_frame() {
        let mut payload = b"SND".to_vec();
        payload.push(0x01);
        payload.extend_from_slice(&1234u32.to_le_bytes());
        payload.extend_from_slice(&1000u16.to_be_bytes());
        payload.extend_from_slice(&(-2i16).to_le_bytes());
        payload.extend_from_slice(&300i16.to_le_bytes());
        payload.push(0xff);
        let frame = SoundFrame::parse(&payload).unwrap();
        assert_eq!(frame.flags, 1);
        assert_eq!(frame.sequence, 1234);
        assert_eq!(frame.smeter, 1000);
        assert_eq!(frame.samples, vec![-2, 300]);
        assert!((frame.rssi_dbm() - -27.0).abs() < 1e-4);
    }

    #[test]
    fn test_server_message_limits() {
        let msg =
            ServerMessage::parse(b"MSG center_freq=15000000 bandwidth=32000000 zoom_max=14")
                .unwrap();
        let o = msg.limit_overrides();
        assert_eq!(o.max_freq_khz, Some(32_000.0));
        assert_eq!(o.max_zoom, Some(14));
        assert_eq!(o.bins, None);

        let msg = ServerMessage::parse(b"MSG wf_fft_size=2048 wf_fps=23 wf_fps_max=30").unwrap();
        let o = msg.limit_overrides();
        assert_eq!(o.bins, Some(2048));
        assert_eq!(o.max_fps, Some(30));
    }

    #[test]
    fn test_server_message_audio_init() {
        let msg = ServerMessage::parse(b"MSG audio_init=0 audio_rate=12000 sample_rate=12001.250")
            .unwrap();
        assert_eq!(msg.audio_rates(), Some((12_000, Some(12_001.25))));
        assert!(ServerMessage::parse(b"MSG bandwidth=1")
            .unwrap()
            .audio_rates()
            .is_none());
        assert!(ServerMessage::parse(b"SND....").is_none());
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Parser for the SDR server's plain-text `/status` page.

use std::collections::HashMap;

use tracing::debug;

use krx_core::ParseError;

pub const DEFAULT_USERS_MAX: u32 = 4;

/// Snapshot of server capacity and metadata. Not cached; goes stale.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    pub users: u32,
    pub users_max: u32,
    pub active: bool,
    pub offline: bool,
    pub name: String,
    pub antenna: String,
    pub location: String,
    pub gps: Option<(f64, f64)>,
    pub min_freq_khz: Option<f64>,
    pub max_freq_khz: Option<f64>,
    pub freq_offset_hz: f64,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self {
            users: 0,
            users_max: DEFAULT_USERS_MAX,
            active: true,
            offline: false,
            name: String::new(),
            antenna: String::new(),
            location: String::new(),
            gps: None,
            min_freq_khz: None,
            max_freq_khz: None,
            freq_offset_hz: 0.0,
        }
    }
}

impl ServerStatus {
    /// Parse `key=value` lines. Malformed fields keep their defaults; a body
    /// without a single `key=value` pair is an error.
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        let map: HashMap<&str, &str> = body
            .lines()
            .filter_map(|line| line.trim_end().split_once('='))
            .collect();
        if map.is_empty() {
            return Err(ParseError::Status("no key=value lines".into()));
        }

        let mut status = ServerStatus::default();
        if let Some(v) = field(&map, "users") {
            status.users = v;
        }
        if let Some(v) = field(&map, "users_max") {
            status.users_max = v;
        }
        if let Some(v) = map.get("status") {
            status.active = matches!(*v, "active" | "private");
        }
        if let Some(v) = map.get("offline") {
            status.offline = *v != "no";
        }
        status.name = map.get("name").unwrap_or(&"").to_string();
        status.antenna = map.get("antenna").unwrap_or(&"").to_string();
        status.location = map.get("loc").unwrap_or(&"").to_string();
        status.gps = map.get("gps").and_then(|v| log_err("gps", parse_gps(v)));
        if let Some((lo, hi)) = map.get("bands").and_then(|v| log_err("bands", parse_bands(v))) {
            status.min_freq_khz = Some(lo / 1000.0);
            status.max_freq_khz = Some(hi / 1000.0);
        }
        if let Some(v) = field::<f64>(&map, "freq_offset") {
            status.freq_offset_hz = v;
        }
        Ok(status)
    }

    pub fn is_full(&self) -> bool {
        self.users >= self.users_max
    }

    pub fn is_available(&self) -> bool {
        self.active && !self.offline
    }

    pub fn freq_offset_khz(&self) -> f64 {
        self.freq_offset_hz / 1000.0
    }
}

fn field<T: std::str::FromStr>(map: &HashMap<&str, &str>, key: &str) -> Option<T> {
    let raw = map.get(key)?;
    log_err(
        key,
        raw.trim()
            .parse()
            .map_err(|_| ParseError::field(key, format!("cannot parse '{raw}'"))),
    )
}

fn log_err<T>(key: &str, res: Result<T, ParseError>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("status field {} defaulted: {}", key, e);
            None
        }
    }
}

/// `"(lat, lon)"`
fn parse_gps(raw: &str) -> Result<(f64, f64), ParseError> {
    let inner = raw.trim().trim_start_matches('(').trim_end_matches(')');
    let (lat, lon) = inner
        .split_once(',')
        .ok_or_else(|| ParseError::field("gps", "missing separator"))?;
    let lat = lat
        .trim()
        .parse()
        .map_err(|_| ParseError::field("gps", "bad latitude"))?;
    let lon = lon
        .trim()
        .parse()
        .map_err(|_| ParseError::field("gps", "bad longitude"))?;
    Ok((lat, lon))
}

/// `"min-max"` in Hz.
fn parse_bands(raw: &str) -> Result<(f64, f64), ParseError> {
    let (lo, hi) = raw
        .trim()
        .split_once('-')
        .ok_or_else(|| ParseError::field("bands", "missing separator"))?;
    let lo = lo
        .parse()
        .map_err(|_| ParseError::field("bands", "bad lower edge"))?;
    let hi = hi
        .parse()
        .map_err(|_| ParseError::field("bands", "bad upper edge"))?;
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "status=active\n\
offline=no\n\
name=Test Kiwi\n\
users=1\n\
users_max=4\n\
gps=(52.123, 21.456)\n\
antenna=Mini-Whip\n\
bands=0-30000000\n\
loc=Warsaw\n\
freq_offset=100000000\n";

    #[test]
    fn test_parse_full_status() {
        let s = ServerStatus::parse(BODY).unwrap();
        assert_eq!(s.users, 1);
        assert_eq!(s.users_max, 4);
        assert!(s.is_available());
        assert!(!s.is_full());
        assert_eq!(s.name, "Test Kiwi");
        assert_eq!(s.antenna, "Mini-Whip");
        assert_eq!(s.location, "Warsaw");
        assert_eq!(s.gps, Some((52.123, 21.456)));
        assert_eq!(s.min_freq_khz, Some(0.0));
        assert_eq!(s.max_freq_khz, Some(30_000.0));
        assert_eq!(s.freq_offset_khz(), 100_000.0);
    }

    #[test]
    fn test_missing_offset_defaults_to_zero() {
        let s = ServerStatus::parse("users=0\nusers_max=4\n").unwrap();
        assert_eq!(s.freq_offset_hz, 0.0);
        assert!(s.gps.is_none());
    }

    #[test]
    fn test_malformed_fields_default() {
        let s = ServerStatus::parse("users=many\ngps=nowhere\nbands=wide\nusers_max=8\n").unwrap();
        assert_eq!(s.users, 0);
        assert_eq!(s.users_max, 8);
        assert!(s.gps.is_none());
        assert!(s.max_freq_khz.is_none());
    }

    #[test]
    fn test_status_flags() {
        let s = ServerStatus::parse("status=private\noffline=no\n").unwrap();
        assert!(s.is_available());
        let s = ServerStatus::parse("status=offline\noffline=yes\n").unwrap();
        assert!(!s.active);
        assert!(s.offline);
        let s = ServerStatus::parse("users=4\nusers_max=4\n").unwrap();
        assert!(s.is_full());
    }

    #[test]
    fn test_empty_body_is_error() {
        assert!(ServerStatus::parse("").is_err());
        assert!(ServerStatus::parse("<html>").is_err());
    }
}

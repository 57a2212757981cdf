// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Level from a config string, case-insensitive. `None` when unset or invalid.
pub fn parse_level(log_level: Option<&str>) -> Option<Level> {
    log_level.and_then(|s| s.trim().parse::<Level>().ok())
}

/// Install the global fmt subscriber. Falls back to INFO if the level is
/// missing or invalid. A second call is a no-op.
pub fn init_logging(log_level: Option<&str>) {
    let level = parse_level(log_level).unwrap_or(Level::INFO);

    let _ = FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(level)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("debug")), Some(Level::DEBUG));
        assert_eq!(parse_level(Some(" WARN ")), Some(Level::WARN));
        assert_eq!(parse_level(Some("loud")), None);
        assert_eq!(parse_level(None), None);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logging(Some("error"));
        init_logging(Some("trace"));
    }
}

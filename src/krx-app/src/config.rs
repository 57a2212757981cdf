// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "krx-rs.toml";
const CONFIG_DIR_NAME: &str = "krx-rs";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Search order for `krx-rs.toml`: current directory, XDG config dir, /etc.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    paths
}

/// Deserialize the `[key]` table of a TOML document.
///
/// `Ok(None)` when the table is absent.
fn parse_section<T: DeserializeOwned>(
    content: &str,
    key: &str,
    path: &Path,
) -> Result<Option<T>, ConfigError> {
    let mut table: toml::Table = toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

    let Some(section) = table.remove(key) else {
        return Ok(None);
    };

    section
        .try_into::<T>()
        .map(Some)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(&content, key, path)
}

/// A configuration struct stored as one section of `krx-rs.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key, e.g. `"krx-client"`.
    fn section_key() -> &'static str;

    /// Load the section from a specific file. A missing section is an error
    /// here since the user pointed at the file explicitly.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Load the first file on the search path that carries the section.
    /// Returns defaults and `None` when nothing was found.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_from_paths(&config_search_paths())
    }

    fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in paths {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(path, Self::section_key())? {
                    return Ok((cfg, Some(path.clone())));
                }
            }
        }
        Ok((Self::default(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Demo {
        level: Option<String>,
        port: u16,
    }

    impl ConfigFile for Demo {
        fn section_key() -> &'static str {
            "demo"
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_section_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.toml", "[demo]\nport = 8073\n");
        let cfg = Demo::load_from_file(&path).unwrap();
        assert_eq!(cfg.port, 8073);
        assert!(cfg.level.is_none());
    }

    #[test]
    fn test_missing_section_is_error_for_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.toml", "[other]\nport = 1\n");
        assert!(matches!(
            Demo::load_from_file(&path),
            Err(ConfigError::ParseError(_, _))
        ));
    }

    #[test]
    fn test_search_skips_files_without_section() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_file(&dir, "a.toml", "[other]\nport = 1\n");
        let second = write_file(&dir, "b.toml", "[demo]\nport = 2\n");
        let missing = dir.path().join("nope.toml");
        let (cfg, found) = Demo::load_from_paths(&[missing, first, second.clone()]).unwrap();
        assert_eq!(cfg.port, 2);
        assert_eq!(found, Some(second));
    }

    #[test]
    fn test_nothing_found_yields_default() {
        let (cfg, found) = Demo::load_from_paths(&[]).unwrap();
        assert_eq!(cfg, Demo::default());
        assert!(found.is_none());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.toml", "[demo\n");
        assert!(matches!(
            Demo::load_from_file(&path),
            Err(ConfigError::ParseError(_, _))
        ));
    }

    #[test]
    fn test_search_paths_end_in_etc() {
        let paths = config_search_paths();
        assert_eq!(paths.first().unwrap(), &PathBuf::from(CONFIG_FILE_NAME));
        assert_eq!(
            paths.last().unwrap(),
            &PathBuf::from("/etc/krx-rs/krx-rs.toml")
        );
    }
}

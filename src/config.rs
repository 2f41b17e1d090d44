//! Persistent daemon configuration.
//!
//! Options live in a JSON file and are addressed through a closed key set
//! with the `set key [value]` protocol: no key lists everything, a key alone
//! reads it, key plus value writes it. Unknown keys are rejected so a typo
//! never silently creates a dead option.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option {0:?}")]
    UnknownKey(String),
    #[error("bad value {value:?} for {key}: expected {expected}")]
    BadValue {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("cannot access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is malformed: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Offer universe-scope names (built-in types and functions).
    pub propose_builtins: bool,
    /// Ignore file-local import aliases; every package goes by the default
    /// alias its archive declares.
    pub deny_module_renames: bool,
    /// Colon-separated extra directories searched for package archives.
    pub lib_path: String,
    /// When a prefix filter leaves nothing, retry case-insensitively.
    pub ignore_case: bool,
    /// Honour `const`/`var`/`type`/`func`/`module` keyword filters.
    pub class_filtering: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            propose_builtins: false,
            deny_module_renames: false,
            lib_path: String::new(),
            ignore_case: false,
            class_filtering: true,
        }
    }
}

const KEYS: [&str; 5] = [
    "propose-builtins",
    "deny-module-renames",
    "lib-path",
    "ignore-case",
    "class-filtering",
];

impl Config {
    /// Reads the config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn keys() -> &'static [&'static str] {
        &KEYS
    }

    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        match key {
            "propose-builtins" => Ok(self.propose_builtins.to_string()),
            "deny-module-renames" => Ok(self.deny_module_renames.to_string()),
            "lib-path" => Ok(self.lib_path.clone()),
            "ignore-case" => Ok(self.ignore_case.to_string()),
            "class-filtering" => Ok(self.class_filtering.to_string()),
            _ => Err(ConfigError::UnknownKey(key.to_string())),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "propose-builtins" => self.propose_builtins = parse_bool(key, value)?,
            "deny-module-renames" => self.deny_module_renames = parse_bool(key, value)?,
            "lib-path" => self.lib_path = value.to_string(),
            "ignore-case" => self.ignore_case = parse_bool(key, value)?,
            "class-filtering" => self.class_filtering = parse_bool(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// `key value` per line, for the bare `set` command.
    pub fn list(&self) -> String {
        let mut out = String::new();
        for key in KEYS {
            let value = self.get(key).unwrap_or_default();
            let _ = writeln!(out, "{key} {value}");
        }
        out
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: "true or false",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert!(!cfg.propose_builtins);
        assert!(!cfg.deny_module_renames);
        assert!(!cfg.ignore_case);
        assert!(cfg.class_filtering);
        assert!(cfg.lib_path.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut cfg = Config::default();
        cfg.set("propose-builtins", "true").unwrap();
        cfg.set("lib-path", "/opt/pkgs:/usr/lib/go").unwrap();
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/no/such/config.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{\"ignore-case\": true}").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert!(cfg.ignore_case);
        assert!(cfg.class_filtering);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("no-such-key", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.get("no-such-key"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[rstest]
    #[case("propose-builtins")]
    #[case("ignore-case")]
    #[case("class-filtering")]
    fn bool_keys_reject_garbage(#[case] key: &str) {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set(key, "maybe"),
            Err(ConfigError::BadValue { .. })
        ));
    }

    #[test]
    fn list_covers_every_key() {
        let listing = Config::default().list();
        for key in Config::keys() {
            assert!(listing.contains(key), "missing {key}");
        }
    }
}

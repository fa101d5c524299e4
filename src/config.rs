//! Startup configuration, loaded once from a TOML file named on the CLI.
//! One `serde`-deserialized struct covering listen address, interval, and
//! per-capability driver selection.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the control socket binds to, e.g. "0.0.0.0:4344".
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path to the persisted schedule document.
    pub timetable_path: PathBuf,

    /// Seconds between control-cycle evaluations absent any notification.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds to wait before retrying after a thermometer/actuator error.
    #[serde(default = "default_sleep_on_error_secs")]
    pub sleep_on_error_secs: u64,

    #[serde(default)]
    pub thermometer: DriverConfig,

    #[serde(default)]
    pub heating: DriverConfig,

    /// Absent when cooling shares the heating relay.
    #[serde(default)]
    pub cooling: Option<DriverConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverConfig {
    /// A fixed reading / a no-op switch, for dry runs and tests.
    #[default]
    Null,
    /// Shells out to an external script.
    Script { path: String },
}

fn default_listen_address() -> String {
    "127.0.0.1:4344".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_sleep_on_error_secs() -> u64 {
    30
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thermod.toml");
        std::fs::write(&path, "timetable_path = \"/var/lib/thermod/timetable.json\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:4344");
        assert_eq!(config.interval_secs, 60);
        assert!(config.cooling.is_none());
    }

    #[test]
    fn loads_script_driver_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thermod.toml");
        std::fs::write(
            &path,
            r#"
timetable_path = "/var/lib/thermod/timetable.json"

[thermometer]
kind = "script"
path = "/usr/local/bin/read-temp"

[heating]
kind = "script"
path = "/usr/local/bin/relay"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        match config.thermometer {
            DriverConfig::Script { path } => assert_eq!(path, "/usr/local/bin/read-temp"),
            DriverConfig::Null => panic!("expected script driver"),
        }
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thermod.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }
}

//! Runtime configuration.
//!
//! Values come from three layers, highest first: command-line flags, the
//! store's `local_settings` table, built-in defaults. The data directory is
//! resolved before the store exists, from `WEIGHBRIDGE_DATA_DIR` or the
//! platform data directory.

use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;

use crate::db;
use crate::error::ConfigError;
use crate::ticket::DEFAULT_TICKET_PREFIX;
use crate::weight_frame::Framing;

pub const DATA_DIR_ENV: &str = "WEIGHBRIDGE_DATA_DIR";
pub const APP_DIR_NAME: &str = "weighbridge";
pub const DEFAULT_LOG_FILTER: &str = "info,weighbridge=debug";
pub const DEFAULT_OPERATOR: &str = "Operator";

/// Persistent settings as `category.key`.
pub const SCALE_PORT: &str = "hardware.scale_port";
pub const SCALE_FRAMING: &str = "hardware.scale_framing";
pub const TICKET_PREFIX: &str = "ticket.prefix";
pub const OPERATOR_NAME: &str = "operator.name";

pub const SETTING_KEYS: &[&str] = &[SCALE_PORT, SCALE_FRAMING, TICKET_PREFIX, OPERATOR_NAME];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// `None` selects the first serial port found.
    pub scale_port: Option<String>,
    pub framing: Framing,
    pub ticket_prefix: String,
    pub operator: String,
    pub log_filter: String,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub scale_port: Option<String>,
    pub framing: Option<Framing>,
    pub ticket_prefix: Option<String>,
    pub operator: Option<String>,
    pub log_filter: Option<String>,
}

/// Resolve the data directory: explicit path, then `WEIGHBRIDGE_DATA_DIR`,
/// then `LOCALAPPDATA` / `XDG_DATA_HOME` / `~/.local/share` + `weighbridge`.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = non_empty_env(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let base = non_empty_env("LOCALAPPDATA")
        .or_else(|| non_empty_env("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .or_else(|| {
            #[cfg(target_os = "windows")]
            {
                non_empty_env("USERPROFILE")
                    .map(|home| PathBuf::from(home).join("AppData").join("Local"))
            }
            #[cfg(not(target_os = "windows"))]
            {
                non_empty_env("HOME").map(|home| PathBuf::from(home).join(".local").join("share"))
            }
        })
        .ok_or(ConfigError::NoDataDir)?;
    Ok(base.join(APP_DIR_NAME))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn split_key(key: &str) -> Result<(&str, &str), ConfigError> {
    if !SETTING_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey(key.to_string()));
    }
    key.split_once('.')
        .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))
}

/// Read a stored setting by `category.key`.
pub fn stored_value(conn: &Connection, key: &str) -> Result<Option<String>, ConfigError> {
    let (category, name) = split_key(key)?;
    Ok(db::get_setting(conn, category, name)?)
}

/// Validate and persist a setting by `category.key`.
pub fn set_value(conn: &Connection, key: &str, value: &str) -> Result<(), ConfigError> {
    let (category, name) = split_key(key)?;
    let value = value.trim();
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    match key {
        SCALE_FRAMING => {
            value.parse::<Framing>().map_err(|_| invalid())?;
        }
        TICKET_PREFIX => {
            let ok = !value.is_empty()
                && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !ok {
                return Err(invalid());
            }
        }
        OPERATOR_NAME if value.is_empty() => return Err(invalid()),
        _ => {}
    }
    db::set_setting(conn, category, name, value)?;
    Ok(())
}

impl AppConfig {
    /// Merge overrides, stored settings and defaults.
    pub fn load(
        data_dir: PathBuf,
        conn: &Connection,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let framing = match overrides.framing {
            Some(framing) => framing,
            None => match stored_value(conn, SCALE_FRAMING)? {
                Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: SCALE_FRAMING.to_string(),
                    value: raw,
                })?,
                None => Framing::default(),
            },
        };

        Ok(Self {
            data_dir,
            scale_port: overrides
                .scale_port
                .or(stored_value(conn, SCALE_PORT)?),
            framing,
            ticket_prefix: overrides
                .ticket_prefix
                .or(stored_value(conn, TICKET_PREFIX)?)
                .unwrap_or_else(|| DEFAULT_TICKET_PREFIX.to_string()),
            operator: overrides
                .operator
                .or(stored_value(conn, OPERATOR_NAME)?)
                .unwrap_or_else(|| DEFAULT_OPERATOR.to_string()),
            log_filter: overrides
                .log_filter
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::run_migrations_for_test(&conn);
        conn
    }

    #[test]
    #[serial]
    fn test_data_dir_env_wins() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/wb-data");
        let dir = resolve_data_dir(None).unwrap();
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(dir, PathBuf::from("/tmp/wb-data"));
    }

    #[test]
    #[serial]
    fn test_explicit_data_dir_beats_env() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/wb-env");
        let dir = resolve_data_dir(Some(PathBuf::from("/srv/wb"))).unwrap();
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(dir, PathBuf::from("/srv/wb"));
    }

    #[test]
    #[serial]
    fn test_platform_data_dir_fallback() {
        std::env::remove_var(DATA_DIR_ENV);
        let saved_local = std::env::var("LOCALAPPDATA").ok();
        let saved_xdg = std::env::var("XDG_DATA_HOME").ok();
        std::env::remove_var("LOCALAPPDATA");
        std::env::set_var("XDG_DATA_HOME", "/home/op/.data");

        let dir = resolve_data_dir(None).unwrap();

        std::env::remove_var("XDG_DATA_HOME");
        if let Some(v) = saved_local {
            std::env::set_var("LOCALAPPDATA", v);
        }
        if let Some(v) = saved_xdg {
            std::env::set_var("XDG_DATA_HOME", v);
        }
        assert_eq!(dir, PathBuf::from("/home/op/.data").join(APP_DIR_NAME));
    }

    #[test]
    fn test_defaults_without_settings() {
        let conn = test_conn();
        let cfg = AppConfig::load(PathBuf::from("/d"), &conn, ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.scale_port, None);
        assert_eq!(cfg.framing, Framing::Chunk);
        assert_eq!(cfg.ticket_prefix, "WB");
        assert_eq!(cfg.operator, DEFAULT_OPERATOR);
        assert_eq!(cfg.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_stored_settings_then_overrides() {
        let conn = test_conn();
        set_value(&conn, SCALE_PORT, "/dev/ttyUSB0").unwrap();
        set_value(&conn, SCALE_FRAMING, "line").unwrap();
        set_value(&conn, TICKET_PREFIX, "JWS").unwrap();

        let cfg = AppConfig::load(PathBuf::from("/d"), &conn, ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.scale_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cfg.framing, Framing::Line);
        assert_eq!(cfg.ticket_prefix, "JWS");

        let cfg = AppConfig::load(
            PathBuf::from("/d"),
            &conn,
            ConfigOverrides {
                scale_port: Some("COM4".into()),
                framing: Some(Framing::Chunk),
                ..ConfigOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(cfg.scale_port.as_deref(), Some("COM4"));
        assert_eq!(cfg.framing, Framing::Chunk);
        assert_eq!(cfg.ticket_prefix, "JWS");
    }

    #[test]
    fn test_set_value_validation() {
        let conn = test_conn();
        assert!(matches!(
            set_value(&conn, "hardware.baud_rate", "19200"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            set_value(&conn, SCALE_FRAMING, "packet"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            set_value(&conn, TICKET_PREFIX, "W B"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(stored_value(&conn, TICKET_PREFIX).unwrap(), None);
    }

    #[test]
    fn test_store_fault_is_reported_not_defaulted() {
        let conn = Connection::open_in_memory().unwrap();
        let result = AppConfig::load(PathBuf::from("/d"), &conn, ConfigOverrides::default());
        assert!(matches!(result, Err(ConfigError::Store(_))));
    }
}

//! Process configuration from the environment.
//!
//! `.env` is loaded first (if present), then:
//!
//! | Variable                   | Default                   |
//! |----------------------------|---------------------------|
//! | `SURVEYQUANT_REGISTRY_DIR` | `.surveyquant/registries` |
//! | `SURVEYQUANT_OUTPUT_DIR`   | `surveyquant-out`         |
//! | `SURVEYQUANT_PORT`         | `3000`                    |

use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};
use crate::store::DEFAULT_STORE_DIR;

pub const REGISTRY_DIR_VAR: &str = "SURVEYQUANT_REGISTRY_DIR";
pub const OUTPUT_DIR_VAR: &str = "SURVEYQUANT_OUTPUT_DIR";
pub const PORT_VAR: &str = "SURVEYQUANT_PORT";

pub const DEFAULT_OUTPUT_DIR: &str = "surveyquant-out";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub registry_dir: PathBuf,
    pub output_dir: PathBuf,
    pub port: u16,
}

impl AppConfig {
    /// Read `.env` and the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their default.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get(PORT_VAR) {
            None => DEFAULT_PORT,
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                key: PORT_VAR.to_string(),
                value: raw.clone(),
            })?,
        };

        Ok(Self {
            registry_dir: get(REGISTRY_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
            output_dir: get(OUTPUT_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            port,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registry_dir: PathBuf::from(DEFAULT_STORE_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            port: DEFAULT_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (REGISTRY_DIR_VAR, "/srv/registries"),
            (PORT_VAR, " 8080 "),
            (OUTPUT_DIR_VAR, ""),
        ]))
        .unwrap();
        assert_eq!(config.registry_dir, PathBuf::from("/srv/registries"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn test_invalid_port() {
        let err = AppConfig::from_lookup(lookup(&[(PORT_VAR, "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { ref key, .. } if key == PORT_VAR));
    }
}

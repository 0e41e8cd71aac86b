use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::repository::AppConfigSettings;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_FEATURE_FILE: &str = "features.yaml";
const DEFAULT_REFRESH_SECS: u64 = 300;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub enum FeatureSource {
    Memory { seed_demo: bool },
    File(PathBuf),
    Remote(AppConfigSettings),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub source: FeatureSource,
    pub refresh_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv().is_ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds the config from any variable lookup, `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let refresh_secs = parse_or(&lookup, "REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_SECS)?;
        if refresh_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "REFRESH_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let source = match lookup("FEATURE_SOURCE").as_deref().unwrap_or("memory") {
            "memory" => FeatureSource::Memory {
                seed_demo: parse_or(&lookup, "SEED_DEMO_FEATURES", true)?,
            },
            "file" => FeatureSource::File(
                lookup("FEATURE_FILE")
                    .unwrap_or_else(|| DEFAULT_FEATURE_FILE.to_string())
                    .into(),
            ),
            "remote" => FeatureSource::Remote(remote_settings(&lookup)?),
            other => {
                return Err(ConfigError::Invalid {
                    var: "FEATURE_SOURCE",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            port,
            source,
            refresh_interval: Duration::from_secs(refresh_secs),
        })
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

fn remote_settings(lookup: &impl Fn(&str) -> Option<String>) -> Result<AppConfigSettings, ConfigError> {
    let endpoint = required(lookup, "APPCONFIG_ENDPOINT")?;
    let token = required(lookup, "APPCONFIG_TOKEN")?;
    let keys: Vec<String> = required(lookup, "APPCONFIG_KEYS")?
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();

    if keys.is_empty() {
        return Err(ConfigError::Missing("APPCONFIG_KEYS"));
    }

    let timeout_secs = parse_or(lookup, "APPCONFIG_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;

    Ok(AppConfigSettings {
        endpoint,
        label: lookup("APPCONFIG_LABEL").unwrap_or_default(),
        keys,
        token,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn required(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<String, ConfigError> {
    lookup(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert!(matches!(config.source, FeatureSource::Memory { seed_demo: true }));
    }

    #[test]
    fn test_file_source() {
        let config = config(&[("FEATURE_SOURCE", "file"), ("FEATURE_FILE", "/etc/flags.yaml")]).unwrap();
        match config.source {
            FeatureSource::File(path) => assert_eq!(path, PathBuf::from("/etc/flags.yaml")),
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_remote_source() {
        let config = config(&[
            ("FEATURE_SOURCE", "remote"),
            ("APPCONFIG_ENDPOINT", "https://fake-appconfig.azconfig.io"),
            ("APPCONFIG_LABEL", "dev"),
            ("APPCONFIG_KEYS", "Feature:SearchUI, Feature:BetaMode,"),
            ("APPCONFIG_TOKEN", "token"),
            ("APPCONFIG_TIMEOUT_SECS", "2"),
        ])
        .unwrap();

        match config.source {
            FeatureSource::Remote(settings) => {
                assert_eq!(settings.endpoint, "https://fake-appconfig.azconfig.io");
                assert_eq!(settings.label, "dev");
                assert_eq!(settings.keys, vec!["Feature:SearchUI", "Feature:BetaMode"]);
                assert_eq!(settings.timeout, Duration::from_secs(2));
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { var: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("FEATURE_SOURCE", "database")]),
            Err(ConfigError::Invalid { var: "FEATURE_SOURCE", .. })
        ));
        assert!(matches!(
            config(&[("REFRESH_INTERVAL_SECS", "0")]),
            Err(ConfigError::Invalid { var: "REFRESH_INTERVAL_SECS", .. })
        ));
        assert!(matches!(
            config(&[("FEATURE_SOURCE", "remote"), ("APPCONFIG_ENDPOINT", "http://x")]),
            Err(ConfigError::Missing("APPCONFIG_TOKEN"))
        ));
    }
}

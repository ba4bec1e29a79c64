//! Load config from file and environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rtt_core::{OrchestratorConfig, Role, DEFAULT_MAX_DISTANCE_MM, DEFAULT_SERVICE_NAME};
use serde::Deserialize;

/// Host configuration. File: ~/.config/wifirtt/config.toml or /etc/wifirtt/config.toml.
/// Env overrides: WIFIRTT_ROLE, WIFIRTT_SERVICE_NAME, WIFIRTT_RANGING_INTERVAL_MS, WIFIRTT_LOG_LEVEL.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Role to start with; `none` waits without attaching.
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Delay between ranging attempts (default 2000).
    #[serde(default = "default_ranging_interval_ms")]
    pub ranging_interval_ms: u64,
    /// Subscriber discovery window upper bound (default 100 m).
    #[serde(default = "default_max_distance_mm")]
    pub max_distance_mm: u32,
    /// Used when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub sim: SimConfig,
}

/// Behaviour of the simulated radio.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SimConfig {
    pub peer_distance_mm: i32,
    pub peer_rssi: i32,
    /// Uniform noise added to each distance sample (+/-).
    pub jitter_mm: i32,
    pub discovery_delay_ms: u64,
    pub result_delay_ms: u64,
    /// Chance a per-peer entry comes back failed.
    pub peer_failure_rate: f64,
    /// Chance the whole request fails.
    pub request_failure_rate: f64,
    pub permissions_granted: bool,
    /// Initial Wi-Fi Aware availability.
    pub aware_available: bool,
    /// Toggle Aware availability this often; 0 never toggles.
    pub availability_flap_secs: u64,
    pub rtt_available: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            peer_distance_mm: 3000,
            peer_rssi: -55,
            jitter_mm: 150,
            discovery_delay_ms: 1500,
            result_delay_ms: 100,
            peer_failure_rate: 0.1,
            request_failure_rate: 0.05,
            permissions_granted: true,
            aware_available: true,
            availability_flap_secs: 0,
            rtt_available: true,
        }
    }
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}
fn default_ranging_interval_ms() -> u64 {
    2000
}
fn default_max_distance_mm() -> u32 {
    DEFAULT_MAX_DISTANCE_MM
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::None,
            service_name: default_service_name(),
            ranging_interval_ms: default_ranging_interval_ms(),
            max_distance_mm: default_max_distance_mm(),
            log_level: default_log_level(),
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            service_name: self.service_name.clone(),
            ranging_interval: Duration::from_millis(self.ranging_interval_ms),
            max_distance_mm: self.max_distance_mm,
            ..OrchestratorConfig::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ranging_interval_ms == 0 {
            return Err(ConfigError::Invalid("ranging_interval_ms must be positive"));
        }
        if self.service_name.is_empty() {
            return Err(ConfigError::Invalid("service_name must not be empty"));
        }
        let rate_ok = |r: f64| (0.0..=1.0).contains(&r);
        if !rate_ok(self.sim.peer_failure_rate) || !rate_ok(self.sim.request_failure_rate) {
            return Err(ConfigError::Invalid("sim failure rates must be within 0..=1"));
        }
        if self.sim.jitter_mm < 0 {
            return Err(ConfigError::Invalid("sim.jitter_mm must not be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Load config: default, then config file (explicit path, or the first standard path that
/// exists), then env vars.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut c = match explicit {
        Some(p) => load_file(p)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => load_file(&p)?,
            None => Config::default(),
        },
    };
    apply_env(&mut c, |k| std::env::var(k).ok())?;
    c.validate()?;
    Ok(c)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
    if let Some(s) = var("WIFIRTT_ROLE") {
        c.role = s.parse().map_err(|_| ConfigError::Env {
            var: "WIFIRTT_ROLE",
            value: s.clone(),
        })?;
    }
    if let Some(s) = var("WIFIRTT_SERVICE_NAME") {
        c.service_name = s;
    }
    if let Some(s) = var("WIFIRTT_RANGING_INTERVAL_MS") {
        c.ranging_interval_ms = s.parse().map_err(|_| ConfigError::Env {
            var: "WIFIRTT_RANGING_INTERVAL_MS",
            value: s.clone(),
        })?;
    }
    if let Some(s) = var("WIFIRTT_LOG_LEVEL") {
        c.log_level = s;
    }
    Ok(())
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/wifirtt/config.toml"));
    }
    out.push(PathBuf::from("/etc/wifirtt/config.toml"));
    out
}

fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c.role, Role::None);
        assert_eq!(c.service_name, "My_Rtt_Service");
        assert_eq!(c.ranging_interval_ms, 2000);
        assert_eq!(c.sim.peer_distance_mm, 3000);
        assert_eq!(
            c.orchestrator().ranging_interval,
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn parses_role_and_sim_table() {
        let c: Config = toml::from_str(
            r#"
            role = "subscriber"
            ranging_interval_ms = 500

            [sim]
            peer_distance_mm = 1200
            request_failure_rate = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(c.role, Role::Subscriber);
        assert_eq!(c.orchestrator().ranging_interval, Duration::from_millis(500));
        assert_eq!(c.sim.peer_distance_mm, 1200);
        assert_eq!(c.sim.peer_rssi, -55);
        assert!(c.sim.aware_available);
        assert_eq!(c.sim.availability_flap_secs, 0);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(toml::from_str::<Config>("proxy_port = 1").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("WIFIRTT_ROLE", "publisher"),
            ("WIFIRTT_RANGING_INTERVAL_MS", "750"),
            ("WIFIRTT_SERVICE_NAME", "Lab_Rtt"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        apply_env(&mut c, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.role, Role::Publisher);
        assert_eq!(c.ranging_interval_ms, 750);
        assert_eq!(c.orchestrator().service_name, "Lab_Rtt");
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let mut c = Config::default();
        let err = apply_env(&mut c, |k| {
            (k == "WIFIRTT_RANGING_INTERVAL_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut c = Config::default();
        c.ranging_interval_ms = 0;
        assert!(c.validate().is_err());
        let mut c = Config::default();
        c.sim.peer_failure_rate = 1.5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load(Some(Path::new("/nonexistent/wifirtt.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;

/// Environment variable naming the config file when none is given on the command line
pub const CONFIG_ENV: &str = "BPBRIDGE_CONFIG";

/// Service configuration. Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the HTTP server listens on
    pub bind: SocketAddr,
    /// Only devices whose advertised name contains this are listed by a scan
    pub device_name: String,
    /// How long a scan listens for advertisements
    pub scan_secs: u64,
    /// How long to wait for a connection to be established
    pub connect_timeout_secs: u64,
    /// Directory served for any path outside the API
    pub static_dir: PathBuf,
    /// Accepted readings are appended here as JSON lines when set
    pub readings_log: Option<PathBuf>,
    /// Accept untagged frames, read at fixed offsets
    pub fixed_offset_fallback: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            device_name: "KN-550BT".into(),
            scan_secs: 10,
            connect_timeout_secs: 30,
            static_dir: PathBuf::from("../web"),
            readings_log: None,
            fixed_offset_fallback: true,
        }
    }
}

impl BridgeConfig {
    /// Load from the file named by the first command line argument, or by
    /// `BPBRIDGE_CONFIG`, falling back to the defaults if neither is set.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = std::env::args_os()
            .nth(1)
            .or_else(|| std::env::var_os(CONFIG_ENV))
            .map(PathBuf::from);
        match path {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config in {}", path.display()))
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[test]
fn test_partial_config_takes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bpbridge.json");
    fs::write(&path, r#"{"bind": "127.0.0.1:9000", "readings_log": "/tmp/readings.jsonl"}"#).unwrap();

    let config = BridgeConfig::load(&path).unwrap();
    assert_eq!(config.bind, SocketAddr::from(([127, 0, 0, 1], 9000)));
    assert_eq!(config.readings_log, Some(PathBuf::from("/tmp/readings.jsonl")));
    assert_eq!(config.device_name, "KN-550BT");
    assert_eq!(config.scan_duration(), Duration::from_secs(10));
    assert!(config.fixed_offset_fallback);
}

#[test]
fn test_invalid_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bpbridge.json");
    fs::write(&path, r#"{"scan_secs": "ten"}"#).unwrap();

    let err = BridgeConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config"));
}

#[test]
fn test_missing_config_is_an_error() {
    assert!(BridgeConfig::load(Path::new("/nonexistent/bpbridge.json")).is_err());
}

//! YAML configuration
//!
//! An explicitly named file must load. Without one, a short list of default
//! locations is searched and the first usable file wins; if none is usable
//! the configuration is simply empty.

use anyhow::{bail, Context, Result};
use rfm_core::{time, DEFAULT_BIND_ADDR, DEFAULT_WS_URL};
use rfm_host::{CancellationMode, HostConfig};
use rfm_probe::ProbeConfig;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::animate::OutputFormat;

/// Default config file name in the working directory
pub const LOCAL_CONFIG: &str = "config.yaml";

/// Default config file name next to the executable
pub const BUNDLED_CONFIG: &str = "default_config.yaml";

/// Locations searched when no path is given, in order
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".rfm").join(LOCAL_CONFIG));
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(BUNDLED_CONFIG));
    }
    paths
}

/// Load the raw configuration mapping
pub fn load(path: Option<&Path>) -> Result<Mapping> {
    match path {
        Some(path) => {
            let mapping = read_mapping(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(mapping)
        }
        None => Ok(search(&default_paths())),
    }
}

/// First candidate that reads and parses as a mapping, else an empty mapping
pub fn search(candidates: &[PathBuf]) -> Mapping {
    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        match read_mapping(candidate) {
            Ok(mapping) => {
                info!("Loaded configuration from {}", candidate.display());
                return mapping;
            }
            Err(e) => debug!("Skipping {}: {:#}", candidate.display(), e),
        }
    }
    debug!("No configuration file found, using defaults");
    Mapping::new()
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => bail!("Config file {} is not a mapping", path.display()),
    }
}

/// Typed view of the configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: HostSettings,
    pub probe: ProbeSettings,
    pub animation: AnimationSettings,
}

impl Settings {
    pub fn from_mapping(mapping: &Mapping) -> Result<Self> {
        serde_yaml::from_value(Value::Mapping(mapping.clone())).context("Invalid configuration")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub bind: String,
    /// Seconds before each progress frame
    pub progress_interval: f64,
    pub cancellation: CancellationMode,
    pub announce_connections: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDR.to_string(),
            progress_interval: 0.5,
            cancellation: CancellationMode::default(),
            announce_connections: false,
        }
    }
}

impl HostSettings {
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            progress_interval: time::to_duration(self.progress_interval),
            cancellation: self.cancellation,
            announce_connections: self.announce_connections,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub url: String,
    pub ping_window: f64,
    pub operation_window: f64,
    pub cancel_window: f64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            ping_window: 2.0,
            operation_window: 5.0,
            cancel_window: 2.0,
        }
    }
}

impl ProbeSettings {
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            url: self.url.clone(),
            ping_window: time::to_duration(self.ping_window),
            operation_window: time::to_duration(self.operation_window),
            cancel_window: time::to_duration(self.cancel_window),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    /// Rendering script; relative paths resolve against the working directory
    pub script: PathBuf,
    /// Interpreters tried in order
    pub interpreters: Vec<String>,
    /// Command used to open the rendered file
    pub viewer: String,
    /// Output base name, without extension
    pub output: String,
    /// Skip the format prompt when set
    pub format: Option<OutputFormat>,
    pub dpi: u32,
    pub fps: u32,
    pub duration: u32,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            script: PathBuf::from("animate_rfm.py"),
            interpreters: vec!["python".to_string(), "python3".to_string()],
            viewer: "xdg-open".to_string(),
            output: "rfm_animation".to_string(),
            format: None,
            dpi: 150,
            fps: 30,
            duration: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_explicit_path_loads() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rfm.yaml", "host:\n  bind: 0.0.0.0:9000\n");

        let mapping = load(Some(&path)).unwrap();
        let settings = Settings::from_mapping(&mapping).unwrap();
        assert_eq!(settings.host.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_explicit_missing_path_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.yaml");

        let err = load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.yaml"));
    }

    #[test]
    fn test_explicit_invalid_yaml_errors() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.yaml", "host: [unclosed\n");

        let err = load(Some(&path)).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("broken.yaml"), "{}", message);
        assert!(message.contains("parse"), "{}", message);
    }

    #[test]
    fn test_explicit_scalar_document_errors() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "scalar.yaml", "just a string\n");

        assert!(load(Some(&path)).is_err());
    }

    #[test]
    fn test_empty_document_is_empty_mapping() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.yaml", "");

        assert!(load(Some(&path)).unwrap().is_empty());
    }

    #[test]
    fn test_search_takes_first_usable() {
        let dir = TempDir::new().unwrap();
        let broken = write(&dir, "a.yaml", "{{{{");
        let good = write(&dir, "b.yaml", "probe:\n  url: ws://example:1\n");
        let later = write(&dir, "c.yaml", "probe:\n  url: ws://later:2\n");

        let mapping = search(&[dir.path().join("absent.yaml"), broken, good, later]);
        let settings = Settings::from_mapping(&mapping).unwrap();
        assert_eq!(settings.probe.url, "ws://example:1");
    }

    #[test]
    fn test_search_nothing_usable_is_empty() {
        let dir = TempDir::new().unwrap();
        let broken = write(&dir, "a.yaml", "- a list\n- not a mapping\n");

        let mapping = search(&[broken, dir.path().join("absent.yaml")]);
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_default_paths_order() {
        let paths = default_paths();
        assert_eq!(paths[0], PathBuf::from("config.yaml"));
        assert!(paths
            .last()
            .map(|p| p.ends_with(BUNDLED_CONFIG))
            .unwrap_or(false));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_mapping(&Mapping::new()).unwrap();

        assert_eq!(settings.host.bind, "127.0.0.1:8765");
        let host = settings.host.host_config();
        assert_eq!(host.progress_interval, Duration::from_millis(500));
        assert_eq!(host.cancellation, CancellationMode::Detached);
        assert!(!host.announce_connections);

        let probe = settings.probe.probe_config();
        assert_eq!(probe.url, "ws://127.0.0.1:8765");
        assert_eq!(probe.operation_window, Duration::from_secs(5));

        assert_eq!(settings.animation.interpreters, vec!["python", "python3"]);
        assert_eq!(settings.animation.viewer, "xdg-open");
        assert_eq!(settings.animation.format, None);
    }

    #[test]
    fn test_settings_partial_and_unknown_keys() {
        let mapping: Mapping = serde_yaml::from_str(
            "host:\n  cancellation: cooperative\n  progress_interval: 0.1\nanimation:\n  format: mp4\n  dpi: 300\nextra:\n  ignored: true\n",
        )
        .unwrap();
        let settings = Settings::from_mapping(&mapping).unwrap();

        let host = settings.host.host_config();
        assert_eq!(host.cancellation, CancellationMode::Cooperative);
        assert_eq!(host.progress_interval, Duration::from_millis(100));
        assert_eq!(settings.host.bind, "127.0.0.1:8765");
        assert_eq!(settings.animation.format, Some(OutputFormat::Mp4));
        assert_eq!(settings.animation.dpi, 300);
        assert_eq!(settings.animation.fps, 30);
    }

    #[test]
    fn test_settings_wrong_type_errors() {
        let mapping: Mapping = serde_yaml::from_str("animation:\n  dpi: high\n").unwrap();
        assert!(Settings::from_mapping(&mapping).is_err());
    }
}

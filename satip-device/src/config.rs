//! Configuration loading for the SAT>IP device core.
//!
//! Configuration is read from a TOML file when one is given, otherwise from
//! `SATIP_*` environment variables, falling back to defaults for anything
//! left unset.
//!
//! ```toml
//! [device]
//! operating_mode = "normal"
//! device_count = 2
//! frontend_reuse = true
//! cicams = ["Viaccess", "Irdeto"]
//! disabled_sources = ["S13.0E"]
//!
//! [logging]
//! log_dir = "logs"
//! level = "info"
//! trace = ["chan_switch", "pids"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use satip_protocol::{ca_system_by_name, CaSystem, Source, TS_PACKET_SIZE};

use crate::error::ConfigError;

/// Smallest stream buffer accepted, in bytes.
pub const MIN_BUFFER_SIZE: usize = 16 * TS_PACKET_SIZE;

/// How eagerly devices offer themselves to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Provide no sources at all.
    Off,
    /// Avoid recordings and report many systems so the host prefers other devices.
    Low,
    #[default]
    Normal,
    /// Report a single system so the host prefers these devices.
    High,
}

impl OperatingMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Some(OperatingMode::Off),
            "low" => Some(OperatingMode::Low),
            "normal" => Some(OperatingMode::Normal),
            "high" => Some(OperatingMode::High),
            _ => None,
        }
    }
}

/// Debug categories that can be switched on individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceCategory {
    ChanSwitch,
    Pids,
    Ci,
    Func,
}

impl TraceCategory {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chan_switch" => Some(TraceCategory::ChanSwitch),
            "pids" => Some(TraceCategory::Pids),
            "ci" => Some(TraceCategory::Ci),
            "func" => Some(TraceCategory::Func),
            _ => None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Directory for rolling log files; console only when unset.
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    pub level: String,
    pub trace: Vec<TraceCategory>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            retention_days: 7,
            level: "info".to_string(),
            trace: Vec::new(),
        }
    }
}

/// Resolved configuration shared by every device.
#[derive(Debug, Clone)]
pub struct SatipConfig {
    pub operating_mode: OperatingMode,
    pub detached_mode: bool,
    pub frontend_reuse: bool,
    pub eit_scan: bool,
    pub ci_extension: bool,
    /// CA system families handled by CI slot 1 and 2.
    pub cicams: [Option<&'static CaSystem>; 2],
    pub disabled_sources: Vec<Source>,
    pub device_count: usize,
    pub buffer_size: usize,
    pub tuning_timeout: Duration,
    pub ready_timeout: Duration,
    pub buffer_read_timeout: Duration,
    pub buffer_write_timeout: Duration,
    pub logging: LoggingConfig,
}

impl Default for SatipConfig {
    fn default() -> Self {
        Self {
            operating_mode: OperatingMode::Normal,
            detached_mode: false,
            frontend_reuse: true,
            eit_scan: true,
            ci_extension: false,
            cicams: [None, None],
            disabled_sources: Vec::new(),
            device_count: 2,
            buffer_size: 2 * 1024 * 1024,
            tuning_timeout: Duration::from_millis(1000),
            ready_timeout: Duration::from_millis(2000),
            buffer_read_timeout: Duration::from_millis(10),
            buffer_write_timeout: Duration::from_millis(10),
            logging: LoggingConfig::default(),
        }
    }
}

impl SatipConfig {
    pub fn is_operating_mode_off(&self) -> bool {
        self.operating_mode == OperatingMode::Off
    }

    pub fn is_operating_mode_low(&self) -> bool {
        self.operating_mode == OperatingMode::Low
    }

    pub fn is_operating_mode_high(&self) -> bool {
        self.operating_mode == OperatingMode::High
    }

    pub fn is_source_disabled(&self, source: Source) -> bool {
        self.disabled_sources.contains(&source)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.resolve()
    }
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    device: DeviceSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceSection {
    operating_mode: Option<OperatingMode>,
    detached_mode: Option<bool>,
    frontend_reuse: Option<bool>,
    eit_scan: Option<bool>,
    ci_extension: Option<bool>,
    cicams: Option<Vec<String>>,
    disabled_sources: Option<Vec<String>>,
    device_count: Option<usize>,
    buffer_size: Option<usize>,
    tuning_timeout_ms: Option<u64>,
    ready_timeout_ms: Option<u64>,
    buffer_read_timeout_ms: Option<u64>,
    buffer_write_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
    trace: Option<Vec<TraceCategory>>,
}

impl ConfigFile {
    fn resolve(self) -> Result<SatipConfig, ConfigError> {
        let defaults = SatipConfig::default();
        let d = self.device;
        let l = self.logging;

        let cicams = match d.cicams {
            Some(names) => parse_cicams(names.iter().map(String::as_str))?,
            None => defaults.cicams,
        };
        let disabled_sources = match d.disabled_sources {
            Some(codes) => parse_sources(codes.iter().map(String::as_str))?,
            None => defaults.disabled_sources,
        };

        Ok(SatipConfig {
            operating_mode: d.operating_mode.unwrap_or(defaults.operating_mode),
            detached_mode: d.detached_mode.unwrap_or(defaults.detached_mode),
            frontend_reuse: d.frontend_reuse.unwrap_or(defaults.frontend_reuse),
            eit_scan: d.eit_scan.unwrap_or(defaults.eit_scan),
            ci_extension: d.ci_extension.unwrap_or(defaults.ci_extension),
            cicams,
            disabled_sources,
            device_count: d.device_count.unwrap_or(defaults.device_count),
            buffer_size: match d.buffer_size {
                Some(size) => check_buffer_size(size)?,
                None => defaults.buffer_size,
            },
            tuning_timeout: d
                .tuning_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tuning_timeout),
            ready_timeout: d
                .ready_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.ready_timeout),
            buffer_read_timeout: d
                .buffer_read_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.buffer_read_timeout),
            buffer_write_timeout: d
                .buffer_write_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.buffer_write_timeout),
            logging: LoggingConfig {
                log_dir: l.log_dir.map(PathBuf::from),
                retention_days: l.retention_days.unwrap_or(defaults.logging.retention_days),
                level: l.level.unwrap_or(defaults.logging.level),
                trace: l.trace.unwrap_or_default(),
            },
        })
    }
}

fn check_buffer_size(size: usize) -> Result<usize, ConfigError> {
    if size < MIN_BUFFER_SIZE {
        return Err(ConfigError::BufferTooSmall {
            size,
            min: MIN_BUFFER_SIZE,
        });
    }
    Ok(size)
}

fn parse_cicams<'a>(
    names: impl Iterator<Item = &'a str>,
) -> Result<[Option<&'static CaSystem>; 2], ConfigError> {
    let mut cicams = [None, None];
    for (slot, name) in names.take(2).enumerate() {
        if name.trim().is_empty() {
            continue;
        }
        cicams[slot] =
            Some(ca_system_by_name(name).ok_or_else(|| ConfigError::UnknownCaSystem(name.to_string()))?);
    }
    Ok(cicams)
}

fn parse_sources<'a>(codes: impl Iterator<Item = &'a str>) -> Result<Vec<Source>, ConfigError> {
    codes
        .filter(|code| !code.trim().is_empty())
        .map(|code| {
            code.parse::<Source>().map_err(|e| ConfigError::InvalidSource {
                value: code.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn parse_bool(s: &str) -> bool {
    let lower = s.trim().to_lowercase();
    lower == "1" || lower == "true" || lower == "yes" || lower == "on"
}

/// Load configuration.
///
/// Searches for configuration in the following order:
/// 1. The given TOML file
/// 2. Environment variables (SATIP_*)
/// 3. Default values
pub fn load_config(path: Option<&Path>) -> Result<SatipConfig, ConfigError> {
    if let Some(path) = path {
        info!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path)?;
        return SatipConfig::from_toml_str(&content);
    }

    load_from_env(|key| std::env::var(key).ok())
}

/// Load configuration from environment variables, looked up through `var`.
pub fn load_from_env<F>(var: F) -> Result<SatipConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = SatipConfig::default();

    if let Some(mode) = var("SATIP_OPERATING_MODE").as_deref().and_then(OperatingMode::parse) {
        config.operating_mode = mode;
    }
    if let Some(v) = var("SATIP_DETACHED") {
        config.detached_mode = parse_bool(&v);
    }
    if let Some(v) = var("SATIP_FRONTEND_REUSE") {
        config.frontend_reuse = parse_bool(&v);
    }
    if let Some(v) = var("SATIP_EIT_SCAN") {
        config.eit_scan = parse_bool(&v);
    }
    if let Some(v) = var("SATIP_CI_EXTENSION") {
        config.ci_extension = parse_bool(&v);
    }
    if let Some(v) = var("SATIP_CICAMS") {
        config.cicams = parse_cicams(v.split(','))?;
    }
    if let Some(v) = var("SATIP_DISABLED_SOURCES") {
        config.disabled_sources = parse_sources(v.split(','))?;
    }
    if let Some(n) = var("SATIP_DEVICE_COUNT").and_then(|s| s.trim().parse().ok()) {
        config.device_count = n;
    }
    if let Some(n) = var("SATIP_BUFFER_SIZE").and_then(|s| s.trim().parse().ok()) {
        config.buffer_size = check_buffer_size(n)?;
    }
    if let Some(ms) = var("SATIP_TUNING_TIMEOUT").and_then(|s| s.trim().parse().ok()) {
        config.tuning_timeout = Duration::from_millis(ms);
    }
    if let Some(dir) = var("SATIP_LOG_DIR") {
        config.logging.log_dir = Some(PathBuf::from(dir));
    }
    if let Some(level) = var("SATIP_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(v) = var("SATIP_TRACE") {
        config.logging.trace = v.split(',').filter_map(TraceCategory::parse).collect();
    }

    debug!(
        "Using environment/default config: mode={:?}, devices={}",
        config.operating_mode, config.device_count
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = SatipConfig::from_toml_str("").unwrap();
        assert_eq!(config.operating_mode, OperatingMode::Normal);
        assert!(config.frontend_reuse);
        assert_eq!(config.device_count, 2);
        assert_eq!(config.tuning_timeout, Duration::from_millis(1000));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
[device]
operating_mode = "low"
frontend_reuse = false
device_count = 4
cicams = ["Viaccess", "irdeto"]
disabled_sources = ["S13.0E", "T"]
tuning_timeout_ms = 500

[logging]
log_dir = "/var/log/satip"
trace = ["chan_switch", "pids"]
"#;
        let config = SatipConfig::from_toml_str(content).unwrap();
        assert!(config.is_operating_mode_low());
        assert!(!config.frontend_reuse);
        assert_eq!(config.device_count, 4);
        assert_eq!(config.cicams[0].unwrap().name, "Viaccess");
        assert_eq!(config.cicams[1].unwrap().name, "Irdeto");
        assert!(config.is_source_disabled(Source::satellite(130)));
        assert!(config.is_source_disabled(Source::terrestrial()));
        assert!(!config.is_source_disabled(Source::satellite(192)));
        assert_eq!(config.tuning_timeout, Duration::from_millis(500));
        assert_eq!(config.logging.log_dir, Some(PathBuf::from("/var/log/satip")));
        assert_eq!(
            config.logging.trace,
            vec![TraceCategory::ChanSwitch, TraceCategory::Pids]
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_source = "[device]\ndisabled_sources = [\"X1\"]\n";
        assert!(matches!(
            SatipConfig::from_toml_str(bad_source),
            Err(ConfigError::InvalidSource { .. })
        ));

        let bad_cam = "[device]\ncicams = [\"NoSuchCam\"]\n";
        assert!(matches!(
            SatipConfig::from_toml_str(bad_cam),
            Err(ConfigError::UnknownCaSystem(_))
        ));

        assert!(matches!(
            SatipConfig::from_toml_str("[device]\ndevice_count = \"two\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_buffer_size_too_small() {
        for size in [0, 1, TS_PACKET_SIZE, MIN_BUFFER_SIZE - 1] {
            let content = format!("[device]\nbuffer_size = {}\n", size);
            assert!(matches!(
                SatipConfig::from_toml_str(&content),
                Err(ConfigError::BufferTooSmall { size: s, min: MIN_BUFFER_SIZE }) if s == size
            ));
        }
        let content = format!("[device]\nbuffer_size = {}\n", MIN_BUFFER_SIZE);
        assert_eq!(
            SatipConfig::from_toml_str(&content).unwrap().buffer_size,
            MIN_BUFFER_SIZE
        );

        let result = load_from_env(|k| (k == "SATIP_BUFFER_SIZE").then(|| "0".to_string()));
        assert!(matches!(result, Err(ConfigError::BufferTooSmall { size: 0, .. })));
    }

    #[test]
    fn test_load_from_env() {
        let vars: HashMap<&str, &str> = [
            ("SATIP_OPERATING_MODE", "high"),
            ("SATIP_DETACHED", "yes"),
            ("SATIP_DEVICE_COUNT", "3"),
            ("SATIP_DISABLED_SOURCES", "S19.2E,C"),
            ("SATIP_TRACE", "ci,bogus,func"),
        ]
        .into_iter()
        .collect();

        let config = load_from_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert!(config.is_operating_mode_high());
        assert!(config.detached_mode);
        assert_eq!(config.device_count, 3);
        assert_eq!(config.disabled_sources, vec![Source::satellite(192), Source::cable()]);
        assert_eq!(config.logging.trace, vec![TraceCategory::Ci, TraceCategory::Func]);
    }

    #[test]
    fn test_load_from_env_defaults() {
        let config = load_from_env(|_| None).unwrap();
        assert_eq!(config.operating_mode, OperatingMode::Normal);
        assert!(!config.detached_mode);
    }
}

//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`apex.toml` by default)
//! 2. environment variables prefixed with `APEX_`
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [[instruments]]
//! id = "laser"
//! kind = "ap1000"
//! host = "192.168.0.10"
//! module = "tunable_laser"
//! slot = 3
//!
//! [[instruments]]
//! id = "chamber"
//! kind = "etuve"
//! port = "/dev/ttyUSB0"
//! ```
//!
//! Every key of an instrument entry other than `id`, `kind`, `name` and
//! `enabled` is handed to the driver factory of its kind.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "apex.toml";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File or environment could not be parsed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Configuration parsed but is inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApexConfig {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Instrument definitions
    #[serde(default)]
    pub instruments: Vec<InstrumentDefinition>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output with colors
    Pretty,
    /// Single-line output without colors
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Instrument family, selecting the driver factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// AP1000 mainframe module
    Ap1000,
    /// AP2XXX OSA embedded instrument
    Ap2xxx,
    /// Etuve thermal chamber
    Etuve,
    /// AB3380 dual filter board
    Ab3380,
    /// AB3510 quad photodetector board
    Ab3510,
}

impl InstrumentKind {
    /// Driver type of the factory handling this kind.
    pub fn driver_type(self) -> &'static str {
        match self {
            InstrumentKind::Ap1000 => "ap1000",
            InstrumentKind::Ap2xxx => "ap2xxx",
            InstrumentKind::Etuve => "etuve",
            InstrumentKind::Ab3380 => "ab3380",
            InstrumentKind::Ab3510 => "ab3510",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_type())
    }
}

/// One `[[instruments]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Unique instrument identifier
    pub id: String,
    /// Instrument family
    pub kind: InstrumentKind,
    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,
    /// Whether this instrument is connected at start-up
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Driver-specific settings
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl InstrumentDefinition {
    /// Driver settings as a TOML value for the factory.
    pub fn driver_config(&self) -> toml::Value {
        toml::Value::Table(self.settings.clone())
    }

    /// Display name, the id when no name is configured.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl ApexConfig {
    /// Load from [`DEFAULT_CONFIG_FILE`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file and the environment.
    ///
    /// Environment variables override the file with prefix `APEX_`.
    /// Example: `APEX_LOGGING_LEVEL=debug`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(path.as_ref()).extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("APEX_").split("_"))
    }

    /// Check levels, ids, ports and intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let mut ids = HashSet::new();
        for instrument in &self.instruments {
            if instrument.id.trim().is_empty() {
                return Err(ConfigError::Invalid("Instrument id must not be empty".into()));
            }
            if !ids.insert(&instrument.id) {
                return Err(ConfigError::Invalid(format!("Duplicate instrument ID: {}", instrument.id)));
            }
            validate_settings(instrument)?;
        }
        Ok(())
    }

    /// Instruments to connect at start-up.
    pub fn enabled_instruments(&self) -> Vec<&InstrumentDefinition> {
        self.instruments.iter().filter(|inst| inst.enabled).collect()
    }
}

fn validate_settings(instrument: &InstrumentDefinition) -> Result<(), ConfigError> {
    let invalid = |msg: String| ConfigError::Invalid(format!("Instrument '{}': {}", instrument.id, msg));
    let settings = &instrument.settings;

    match instrument.kind {
        InstrumentKind::Ap1000 | InstrumentKind::Ap2xxx => {
            if !settings.contains_key("host") {
                return Err(invalid("missing 'host'".into()));
            }
            if let Some(port) = settings.get("port") {
                match port.as_integer() {
                    Some(p) if (1..=65535).contains(&p) => {}
                    _ => return Err(invalid(format!("invalid TCP port {}", port))),
                }
            }
        }
        InstrumentKind::Etuve => match settings.get("port").and_then(|p| p.as_str()) {
            Some(path) if !path.trim().is_empty() => {}
            _ => return Err(invalid("'port' must be a serial port path".into())),
        },
        InstrumentKind::Ab3380 | InstrumentKind::Ab3510 => {
            if let Some(handle) = settings.get("handle") {
                if !matches!(handle.as_integer(), Some(h) if h >= 0) {
                    return Err(invalid(format!("invalid board handle {}", handle)));
                }
            }
        }
    }

    if let Some(interval) = settings.get("poll_interval_s") {
        let seconds = interval.as_float().or_else(|| interval.as_integer().map(|i| i as f64));
        if !matches!(seconds, Some(s) if s >= 0.0) {
            return Err(invalid(format!("invalid poll interval {}", interval)));
        }
    }
    Ok(())
}

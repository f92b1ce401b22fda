use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvest_log::LogConfig;
use serde::{Deserialize, Serialize};

use crate::events::EventsConfig;

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    file: Option<PathBuf>,
    kind: ConfigErrorKind,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn wrap<E>(source: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            file: None,
            kind,
            source: Some(Box::new(source)),
        }
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.file = Some(p.as_ref().to_path_buf());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{} (file {})", self.kind, file.display()),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Controls the periodic harvest.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Seconds between two harvest cycles.
    ///
    /// Defaults to `60` seconds. All event types share this interval.
    pub interval_secs: u64,
}

impl HarvestConfig {
    /// Returns the harvest interval.
    ///
    /// An interval of zero is raised to one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// The full configuration of the harvest core.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Per event type capacity and enablement.
    pub events: EventsConfig,
    /// The periodic harvest.
    pub harvest: HarvestConfig,
    /// Logging of the harvest core itself.
    pub logging: LogConfig,
}

impl Config {
    /// Loads a config from a YAML or JSON file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as YAML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(path))?;
        let reader = io::BufReader::new(file);

        let mut config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_reader(reader)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadJson).file(path))?
        } else {
            serde_yaml::from_reader(reader)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(path))?
        };

        config.normalize();
        Ok(config)
    }

    /// Parses a config from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(s)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml))?;
        config.normalize();
        Ok(config)
    }

    /// Parses a config from a JSON value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_value(value)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadJson))?;
        config.normalize();
        Ok(config)
    }

    /// Replaces invalid settings with their defaults.
    ///
    /// Misconfiguration never fails loading, each replaced value is logged instead.
    pub fn normalize(&mut self) {
        self.events.normalize();
    }
}

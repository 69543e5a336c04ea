//! JSON configuration of an edge or root node.

use std::{
    error::Error,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::RoundConfig;

/// Failures while loading a node configuration.
#[derive(Debug)]
pub enum ConfigErr {
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    /// The file parsed but describes an unusable node.
    Invalid(String),
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "cannot parse {}: {source}", path.display())
            }
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

impl From<ConfigErr> for io::Error {
    fn from(value: ConfigErr) -> Self {
        match value {
            ConfigErr::Read { source, .. } => source,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
}

impl NetworkConfig {
    /// Returns the `ip:port` pair as a connectable address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundsConfig {
    pub num_rounds: u64,
}

impl Default for RoundsConfig {
    fn default() -> Self {
        Self { num_rounds: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FedAvgConfig {
    pub min_fit_clients: usize,
    pub min_available_clients: usize,
    pub min_evaluate_clients: usize,
    pub fraction_fit: f64,
    pub fraction_evaluate: f64,
    pub seed: Option<u64>,
}

impl Default for FedAvgConfig {
    fn default() -> Self {
        Self {
            min_fit_clients: 1,
            min_available_clients: 1,
            min_evaluate_clients: 1,
            fraction_fit: 1.0,
            fraction_evaluate: 1.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub save_path: PathBuf,
    pub initial_checkpoint: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            save_path: PathBuf::from("models"),
            initial_checkpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("logs"),
        }
    }
}

/// The configuration of an edge or root node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    /// Where an edge node serves its aggregate to, absent on the root.
    #[serde(default)]
    pub upstream: Option<NetworkConfig>,
    #[serde(default)]
    pub config: RoundsConfig,
    #[serde(default)]
    pub fed_avg: FedAvgConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigErr> {
        let text = fs::read_to_string(path).map_err(|source| ConfigErr::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigErr::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigErr> {
        let fed_avg = &self.fed_avg;

        if self.config.num_rounds == 0 {
            return Err(ConfigErr::Invalid("num_rounds must be greater than 0".into()));
        }

        if fed_avg.min_available_clients == 0 {
            return Err(ConfigErr::Invalid(
                "min_available_clients must be greater than 0".into(),
            ));
        }

        for (name, fraction) in [
            ("fraction_fit", fed_avg.fraction_fit),
            ("fraction_evaluate", fed_avg.fraction_evaluate),
        ] {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(ConfigErr::Invalid(format!(
                    "{name} ({fraction}) must be within [0, 1]"
                )));
            }
        }

        if fed_avg.min_fit_clients > fed_avg.min_available_clients {
            return Err(ConfigErr::Invalid(format!(
                "min_fit_clients ({}) cannot exceed min_available_clients ({})",
                fed_avg.min_fit_clients, fed_avg.min_available_clients
            )));
        }

        if fed_avg.min_evaluate_clients > fed_avg.min_available_clients {
            return Err(ConfigErr::Invalid(format!(
                "min_evaluate_clients ({}) cannot exceed min_available_clients ({})",
                fed_avg.min_evaluate_clients, fed_avg.min_available_clients
            )));
        }

        Ok(())
    }

    /// Returns the round settings of the driver.
    pub fn round_config(&self) -> RoundConfig {
        RoundConfig {
            num_rounds: self.config.num_rounds,
            min_fit_clients: self.fed_avg.min_fit_clients,
            min_evaluate_clients: self.fed_avg.min_evaluate_clients,
            min_available_clients: self.fed_avg.min_available_clients,
            fraction_fit: self.fed_avg.fraction_fit,
            fraction_evaluate: self.fed_avg.fraction_evaluate,
            seed: self.fed_avg.seed,
        }
    }
}

//! JSON configuration of the orchestrator.

use std::{
    error::Error,
    fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::allocator::{AllocatorConfig, NODE_PLACEHOLDER, ProbeBudget};

/// Failures while loading the orchestrator configuration.
#[derive(Debug)]
pub enum ConfigErr {
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
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

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
}

impl NetworkConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub per_attempt_ms: u64,
    pub budget_ms: u64,
    pub backoff_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            per_attempt_ms: 1_000,
            budget_ms: 30_000,
            backoff_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_ms: u64,
    pub per_attempt_ms: u64,
    pub budget_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            per_attempt_ms: 1_000,
            budget_ms: 5_000,
        }
    }
}

fn default_node_address() -> String {
    format!("{NODE_PLACEHOLDER}:8080")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationConfig {
    pub max_clients_per_edge_server: usize,
    pub run_edge_path: PathBuf,
    pub kill_edge_path: PathBuf,
    #[serde(default = "default_node_address")]
    pub node_address: String,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub provision_timeout_ms: Option<u64>,
}

/// The configuration of the orchestrator process.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    pub network: NetworkConfig,
    pub orchestrator: AllocationConfig,
}

impl OrchestratorConfig {
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
        let orchestrator = &self.orchestrator;

        if orchestrator.max_clients_per_edge_server == 0 {
            return Err(ConfigErr::Invalid(
                "max_clients_per_edge_server must be greater than 0".into(),
            ));
        }

        if !orchestrator.node_address.contains(NODE_PLACEHOLDER) {
            return Err(ConfigErr::Invalid(format!(
                "node_address ({}) must contain {NODE_PLACEHOLDER}",
                orchestrator.node_address
            )));
        }

        let probes = [
            ("probe", orchestrator.probe.per_attempt_ms, orchestrator.probe.budget_ms),
            ("health", orchestrator.health.per_attempt_ms, orchestrator.health.budget_ms),
        ];

        for (name, per_attempt_ms, budget_ms) in probes {
            if per_attempt_ms == 0 || budget_ms == 0 {
                return Err(ConfigErr::Invalid(format!(
                    "{name} timeouts must be greater than 0"
                )));
            }
        }

        if orchestrator.health.interval_ms == 0 {
            return Err(ConfigErr::Invalid(
                "health interval must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Returns the allocator settings, durations converted from milliseconds.
    pub fn allocator_config(&self) -> AllocatorConfig {
        let orchestrator = &self.orchestrator;

        AllocatorConfig {
            capacity: orchestrator.max_clients_per_edge_server,
            node_address: orchestrator.node_address.clone(),
            probe: ProbeBudget {
                per_attempt: Duration::from_millis(orchestrator.probe.per_attempt_ms),
                budget: Duration::from_millis(orchestrator.probe.budget_ms),
            },
            health: ProbeBudget {
                per_attempt: Duration::from_millis(orchestrator.health.per_attempt_ms),
                budget: Duration::from_millis(orchestrator.health.budget_ms),
            },
        }
    }

    pub fn probe_backoff(&self) -> Duration {
        Duration::from_millis(self.orchestrator.probe.backoff_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.orchestrator.health.interval_ms)
    }

    pub fn provision_timeout(&self) -> Option<Duration> {
        self.orchestrator
            .provision_timeout_ms
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrator.json");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let (_dir, path) = write(
            r#"{
                "network": { "ip": "0.0.0.0", "port": 8000 },
                "orchestrator": {
                    "max_clients_per_edge_server": 2,
                    "run_edge_path": "scripts/run_edge.sh",
                    "kill_edge_path": "scripts/kill_edge.sh"
                }
            }"#,
        );

        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.network.addr(), "0.0.0.0:8000");
        assert_eq!(config.provision_timeout(), None);
        assert_eq!(config.health_interval(), Duration::from_secs(10));

        let allocator = config.allocator_config();
        assert_eq!(allocator.capacity, 2);
        assert_eq!(allocator.node_address, "{node}:8080");
        assert_eq!(allocator.probe.budget, Duration::from_secs(30));
    }

    #[test]
    fn explicit_timings_are_milliseconds() {
        let (_dir, path) = write(
            r#"{
                "network": { "ip": "127.0.0.1", "port": 8000 },
                "orchestrator": {
                    "max_clients_per_edge_server": 5,
                    "run_edge_path": "run.sh",
                    "kill_edge_path": "kill.sh",
                    "node_address": "{node}.edge.svc:9000",
                    "probe": { "per_attempt_ms": 250, "budget_ms": 2000, "backoff_ms": 100 },
                    "health": { "interval_ms": 500, "per_attempt_ms": 100, "budget_ms": 300 },
                    "provision_timeout_ms": 60000
                }
            }"#,
        );

        let config = OrchestratorConfig::load(&path).unwrap();
        let allocator = config.allocator_config();

        assert_eq!(allocator.probe.per_attempt, Duration::from_millis(250));
        assert_eq!(allocator.health.budget, Duration::from_millis(300));
        assert_eq!(config.probe_backoff(), Duration::from_millis(100));
        assert_eq!(config.provision_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let (_dir, path) = write(
            r#"{
                "network": { "ip": "127.0.0.1", "port": 8000 },
                "orchestrator": {
                    "max_clients_per_edge_server": 0,
                    "run_edge_path": "run.sh",
                    "kill_edge_path": "kill.sh"
                }
            }"#,
        );

        assert!(matches!(
            OrchestratorConfig::load(&path).unwrap_err(),
            ConfigErr::Invalid(_)
        ));
    }

    #[test]
    fn missing_section_is_a_parse_error() {
        let (_dir, path) = write(r#"{ "network": { "ip": "127.0.0.1", "port": 8000 } }"#);

        assert!(matches!(
            OrchestratorConfig::load(&path).unwrap_err(),
            ConfigErr::Parse { .. }
        ));
    }
}

use std::{error::Error, fmt, io, path::PathBuf, time::Duration};

/// The orchestrator module's result type.
pub type Result<T> = std::result::Result<T, AllocError>;

/// Failures of an allocation request.
#[derive(Debug)]
pub enum AllocError {
    /// The backing process of a new node couldn't be started.
    Provision { node: String, source: ProvisionErr },
    /// The target node didn't answer within the probe budget and was evicted.
    Unavailable { node: String },
    /// The deployment is misconfigured.
    Config(String),
}

impl AllocError {
    /// Whether the caller may retry the same request and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision { node, source } => write!(f, "cannot provision {node}: {source}"),
            Self::Unavailable { node } => {
                write!(f, "edge server {node} is unreachable, retry the allocation")
            }
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl Error for AllocError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Provision { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<AllocError> for io::Error {
    fn from(value: AllocError) -> Self {
        let kind = match value {
            AllocError::Unavailable { .. } => io::ErrorKind::ConnectionRefused,
            AllocError::Config(_) => io::ErrorKind::InvalidInput,
            AllocError::Provision { .. } => io::ErrorKind::Other,
        };

        io::Error::new(kind, value)
    }
}

/// Failures of the start / stop primitives of a node's backing process.
#[derive(Debug)]
pub enum ProvisionErr {
    MissingScript(PathBuf),
    Spawn { script: PathBuf, source: io::Error },
    /// The script exited with a non-zero status.
    Failed {
        script: PathBuf,
        status: Option<i32>,
        stderr: String,
    },
    Timeout { script: PathBuf, after: Duration },
}

impl fmt::Display for ProvisionErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingScript(script) => write!(f, "script {} does not exist", script.display()),
            Self::Spawn { script, source } => {
                write!(f, "cannot run {}: {source}", script.display())
            }
            Self::Failed {
                script,
                status,
                stderr,
            } => {
                let status = match status {
                    Some(code) => code.to_string(),
                    None => "signal".to_string(),
                };

                write!(
                    f,
                    "{} exited with {status}: {}",
                    script.display(),
                    stderr.trim()
                )
            }
            Self::Timeout { script, after } => {
                write!(f, "{} timed out after {after:?}", script.display())
            }
        }
    }
}

impl Error for ProvisionErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

use std::{error::Error, fmt, io, path::PathBuf};

/// The aggregator module's result type.
pub type Result<T> = std::result::Result<T, AggregationErr>;

/// Failures of the round protocol on one node scope.
#[derive(Debug)]
pub enum AggregationErr {
    /// A contribution's shape signature differs from the first contribution of the round.
    ShapeMismatch {
        round: u64,
        contribution: usize,
        expected: Vec<Vec<usize>>,
        got: Vec<Vec<usize>>,
    },
    /// Rounds must be strictly increasing per node scope.
    StaleRound { round: u64, last: u64 },
    /// Fewer clients connected than the round configuration requires.
    NotEnoughClients { available: usize, required: usize },
    /// No parameters to start the first round from.
    InitialParameters(ClientErr),
    /// A checkpoint couldn't be written or read back.
    Checkpoint { path: PathBuf, detail: String },
    Io(io::Error),
}

impl fmt::Display for AggregationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch {
                round,
                contribution,
                expected,
                got,
            } => write!(
                f,
                "shape mismatch in round {round}, contribution {contribution}: \
                 expected {expected:?}, got {got:?}"
            ),
            Self::StaleRound { round, last } => {
                write!(f, "round {round} is not newer than the last round {last}")
            }
            Self::NotEnoughClients {
                available,
                required,
            } => write!(
                f,
                "not enough clients: {available} available, {required} required"
            ),
            Self::InitialParameters(e) => write!(f, "cannot fetch initial parameters: {e}"),
            Self::Checkpoint { path, detail } => {
                write!(f, "checkpoint {}: {detail}", path.display())
            }
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for AggregationErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InitialParameters(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for AggregationErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<AggregationErr> for io::Error {
    fn from(value: AggregationErr) -> Self {
        match value {
            AggregationErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Failures of a single client call.
#[derive(Debug)]
pub enum ClientErr {
    Io(io::Error),
    /// The client answered with an error message.
    Remote(String),
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Remote(detail) => write!(f, "client reported: {detail}"),
            Self::UnexpectedMessage { expected, got } => {
                write!(f, "unexpected message: expected {expected}, got {got}")
            }
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

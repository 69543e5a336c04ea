use std::fmt;

use comms::Parameters;

/// A client's contribution to a fit round.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRes {
    pub params: Parameters,
    pub samples: u64,
}

/// A client's contribution to an evaluation round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluateRes {
    pub loss: f32,
    pub samples: u64,
}

/// A client that failed to contribute to a round.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub client: String,
    pub reason: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.client, self.reason)
    }
}

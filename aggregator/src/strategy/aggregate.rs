use std::sync::Arc;

use comms::Parameters;
use parking_lot::RwLock;

/// The immutable result of one aggregated round.
#[derive(Debug)]
pub struct RoundAggregate {
    round: u64,
    params: Parameters,
    samples: u64,
}

impl RoundAggregate {
    /// Creates a new `RoundAggregate`.
    ///
    /// # Arguments
    /// * `round` - The round that produced it.
    /// * `params` - The aggregated parameter vector.
    /// * `samples` - The total amount of contributing samples.
    pub fn new(round: u64, params: Parameters, samples: u64) -> Self {
        Self {
            round,
            params,
            samples,
        }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// A shared handle to the most recent aggregate of a node scope.
///
/// Only the owning strategy publishes, readers get the whole aggregate at once, so the
/// parameters and the sample count they observe always belong to the same round.
#[derive(Debug, Clone, Default)]
pub struct LatestAggregate(Arc<RwLock<Option<Arc<RoundAggregate>>>>);

impl LatestAggregate {
    /// Creates an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recent aggregate, if any round completed.
    pub fn get(&self) -> Option<Arc<RoundAggregate>> {
        self.0.read().clone()
    }

    /// Replaces the most recent aggregate.
    pub(crate) fn publish(&self, aggregate: RoundAggregate) -> Arc<RoundAggregate> {
        let aggregate = Arc::new(aggregate);
        *self.0.write() = Some(Arc::clone(&aggregate));
        aggregate
    }
}

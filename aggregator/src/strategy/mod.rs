mod aggregate;
mod fedavg;

pub use aggregate::{LatestAggregate, RoundAggregate};
pub use fedavg::{FedAvg, Tier};

use comms::Parameters;

use crate::{EvaluateRes, Failure, FitRes, Result};

/// The per-round aggregation protocol of one node scope.
///
/// Calls for a given scope are strictly sequential, a strategy is driven by a single writer.
pub trait Strategy: Send {
    /// Returns the parameters the first round should start from, if the strategy has any.
    fn initial_parameters(&mut self) -> Result<Option<Parameters>>;

    /// Aggregates the contributions of a fit round.
    ///
    /// # Arguments
    /// * `round` - The round number, strictly increasing between calls.
    /// * `results` - The successful contributions.
    /// * `failures` - The clients that failed to contribute.
    ///
    /// # Returns
    /// The parameters the next round should start from, or `None` if the round produced nothing.
    fn aggregate_fit(
        &mut self,
        round: u64,
        results: Vec<FitRes>,
        failures: Vec<Failure>,
    ) -> Result<Option<Parameters>>;

    /// Aggregates the contributions of an evaluation round.
    ///
    /// # Returns
    /// The sample-weighted loss, or `None` if nobody evaluated.
    fn aggregate_evaluate(
        &mut self,
        round: u64,
        results: Vec<EvaluateRes>,
        failures: Vec<Failure>,
    ) -> Result<Option<f32>>;
}

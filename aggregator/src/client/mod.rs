mod proxy;
mod remote;
mod serve;

pub use proxy::ProxyClient;
pub use remote::RemoteClient;
pub use serve::serve;

use comms::Parameters;

use crate::{ClientErr, EvaluateRes, FitRes};

/// The result type of a single client call.
pub type ClientResult<T> = std::result::Result<T, ClientErr>;

/// A participant of a round, as seen by the tier that drives the rounds.
#[async_trait::async_trait]
pub trait Client: Send {
    /// Identifier used for observability and failure records.
    fn id(&self) -> &str;

    /// Returns the client's current parameters.
    async fn get_parameters(&mut self) -> ClientResult<Parameters>;

    /// Computes an update starting from `params`.
    ///
    /// # Arguments
    /// * `round` - The round being run.
    /// * `params` - The parameters the round starts from.
    ///
    /// # Returns
    /// The updated parameters and the amount of samples behind them.
    async fn fit(&mut self, round: u64, params: Parameters) -> ClientResult<FitRes>;

    /// Evaluates `params`.
    ///
    /// # Returns
    /// `None` if this client doesn't evaluate, which is not a failure.
    async fn evaluate(&mut self, round: u64, params: Parameters)
    -> ClientResult<Option<EvaluateRes>>;

    /// Releases the client once the driver is done with it.
    async fn disconnect(&mut self) -> ClientResult<()> {
        Ok(())
    }
}

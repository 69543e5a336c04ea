use comms::Parameters;
use log::debug;

use super::{Client, ClientResult};
use crate::{EvaluateRes, FitRes, round_log::RoundLog, strategy::LatestAggregate};

/// Presents an edge node's last aggregate to the tier above as a single client.
///
/// Every call is a read of the edge strategy's state, this tier never trains nor evaluates.
pub struct ProxyClient {
    name: String,
    latest: LatestAggregate,
    log: RoundLog,
}

impl ProxyClient {
    /// Creates a new `ProxyClient`.
    ///
    /// # Arguments
    /// * `name` - The edge node's name.
    /// * `latest` - Read handle to the edge strategy's most recent aggregate.
    /// * `log` - The edge node's round log.
    pub fn new(name: impl Into<String>, latest: LatestAggregate, log: RoundLog) -> Self {
        Self {
            name: name.into(),
            latest,
            log,
        }
    }

    /// The last aggregate's parameters and sample count, or an empty vector before any round.
    fn snapshot(&self) -> (Parameters, u64) {
        match self.latest.get() {
            Some(aggregate) => (aggregate.params().clone(), aggregate.samples()),
            None => (Vec::new(), 0),
        }
    }
}

#[async_trait::async_trait]
impl Client for ProxyClient {
    fn id(&self) -> &str {
        &self.name
    }

    async fn get_parameters(&mut self) -> ClientResult<Parameters> {
        self.log
            .client_call("get_parameters called on the edge server.")?;

        let (params, _) = self.snapshot();
        Ok(params)
    }

    async fn fit(&mut self, round: u64, _params: Parameters) -> ClientResult<FitRes> {
        self.log.client_call(&format!(
            "fit called on the edge server for round {round}. \
             Parameters are just loaded, no training performed."
        ))?;

        let (params, samples) = self.snapshot();
        debug!("answering fit with {} arrays, {samples} samples", params.len());
        Ok(FitRes { params, samples })
    }

    async fn evaluate(
        &mut self,
        round: u64,
        _params: Parameters,
    ) -> ClientResult<Option<EvaluateRes>> {
        self.log.client_call(&format!(
            "evaluate called on the edge server for round {round}. \
             Evaluation is not performed on the edge server."
        ))?;

        Ok(None)
    }
}

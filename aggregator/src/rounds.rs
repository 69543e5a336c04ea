//! The server side of the round protocol: drives fit and evaluation rounds over the
//! connected clients and feeds their contributions to a `Strategy`.

use comms::Parameters;
use futures::future;
use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng, seq::index};
use tokio::task;

use crate::{AggregationErr, Client, EvaluateRes, Failure, FitRes, Result, Strategy};

/// How many rounds to run and how many clients take part in each.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    pub num_rounds: u64,
    pub min_fit_clients: usize,
    pub min_evaluate_clients: usize,
    pub min_available_clients: usize,
    pub fraction_fit: f64,
    pub fraction_evaluate: f64,
    pub seed: Option<u64>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            num_rounds: 1,
            min_fit_clients: 1,
            min_evaluate_clients: 1,
            min_available_clients: 1,
            fraction_fit: 1.0,
            fraction_evaluate: 1.0,
            seed: None,
        }
    }
}

/// Runs the rounds of one node scope.
pub struct RoundDriver<S: Strategy> {
    strategy: S,
    clients: Vec<Box<dyn Client>>,
    config: RoundConfig,
    rng: StdRng,
}

impl<S: Strategy> RoundDriver<S> {
    /// Creates a new `RoundDriver`.
    ///
    /// # Arguments
    /// * `strategy` - The aggregation strategy of this node scope.
    /// * `config` - The round configuration.
    pub fn new(strategy: S, config: RoundConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            strategy,
            clients: Vec::new(),
            config,
            rng,
        }
    }

    /// Adds a client to the pool rounds sample from.
    pub fn add_client(&mut self, client: Box<dyn Client>) {
        info!("client {} joined", client.id());
        self.clients.push(client);
    }

    /// Returns the amount of clients in the pool.
    pub fn available(&self) -> usize {
        self.clients.len()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Consumes the driver, returning its strategy.
    pub fn into_strategy(self) -> S {
        self.strategy
    }

    /// Runs every configured round and disconnects the clients afterwards.
    ///
    /// # Returns
    /// The parameters after the last round, or an error if the rounds couldn't start
    /// or a strategy call failed.
    pub async fn run(&mut self) -> Result<Parameters> {
        let available = self.clients.len();
        let required = self.config.min_available_clients.max(1);
        if available < required {
            return Err(AggregationErr::NotEnoughClients {
                available,
                required,
            });
        }

        let mut params = self.initial_parameters().await?;

        for round in 1..=self.config.num_rounds {
            let selected =
                self.sample(self.config.fraction_fit, self.config.min_fit_clients);
            info!("round {round}: fitting {} client(s)", selected.len());

            let (results, failures) = self.fit_round(round, &selected, &params).await;
            let strategy = &mut self.strategy;
            let aggregated =
                task::block_in_place(|| strategy.aggregate_fit(round, results, failures))?;

            if let Some(aggregated) = aggregated {
                params = aggregated;
            }

            let selected = self.sample(
                self.config.fraction_evaluate,
                self.config.min_evaluate_clients,
            );
            if selected.is_empty() {
                continue;
            }

            let (results, failures) = self.evaluate_round(round, &selected, &params).await;
            let strategy = &mut self.strategy;
            let loss =
                task::block_in_place(|| strategy.aggregate_evaluate(round, results, failures))?;

            match loss {
                Some(loss) => info!("round {round}: evaluation loss {loss}"),
                None => info!("round {round}: no evaluation result"),
            }
        }

        for client in &mut self.clients {
            if let Err(e) = client.disconnect().await {
                warn!("failed to disconnect {}: {e}", client.id());
            }
        }

        Ok(params)
    }

    /// Takes the strategy's seed, falling back to asking one of the clients.
    async fn initial_parameters(&mut self) -> Result<Parameters> {
        let strategy = &mut self.strategy;
        if let Some(params) = task::block_in_place(|| strategy.initial_parameters())? {
            return Ok(params);
        }

        let pick = index::sample(&mut self.rng, self.clients.len(), 1).index(0);
        let client = &mut self.clients[pick];
        info!("requesting initial parameters from {}", client.id());

        client
            .get_parameters()
            .await
            .map_err(AggregationErr::InitialParameters)
    }

    /// Picks `max(ceil(fraction * available), min_clients)` clients, capped at the pool size.
    fn sample(&mut self, fraction: f64, min_clients: usize) -> Vec<usize> {
        let available = self.clients.len();
        let wanted = (fraction.clamp(0.0, 1.0) * available as f64).ceil() as usize;
        let amount = wanted.max(min_clients).min(available);

        let mut selected = index::sample(&mut self.rng, available, amount).into_vec();
        selected.sort_unstable();
        selected
    }

    async fn fit_round(
        &mut self,
        round: u64,
        selected: &[usize],
        params: &Parameters,
    ) -> (Vec<FitRes>, Vec<Failure>) {
        let calls = self
            .clients
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| selected.contains(i))
            .map(|(_, client)| {
                let params = params.clone();
                async move {
                    let res = client.fit(round, params).await;
                    (client.id().to_string(), res)
                }
            });

        let mut results = Vec::with_capacity(selected.len());
        let mut failures = Vec::new();

        for (client, res) in future::join_all(calls).await {
            match res {
                Ok(res) => results.push(res),
                Err(e) => failures.push(Failure {
                    client,
                    reason: e.to_string(),
                }),
            }
        }

        (results, failures)
    }

    async fn evaluate_round(
        &mut self,
        round: u64,
        selected: &[usize],
        params: &Parameters,
    ) -> (Vec<EvaluateRes>, Vec<Failure>) {
        let calls = self
            .clients
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| selected.contains(i))
            .map(|(_, client)| {
                let params = params.clone();
                async move {
                    let res = client.evaluate(round, params).await;
                    (client.id().to_string(), res)
                }
            });

        let mut results = Vec::with_capacity(selected.len());
        let mut failures = Vec::new();

        for (client, res) in future::join_all(calls).await {
            match res {
                Ok(Some(res)) => results.push(res),
                Ok(None) => {}
                Err(e) => failures.push(Failure {
                    client,
                    reason: e.to_string(),
                }),
            }
        }

        (results, failures)
    }
}

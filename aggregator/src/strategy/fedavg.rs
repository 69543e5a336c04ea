use std::{
    io,
    path::{Path, PathBuf},
};

use comms::{Parameters, params};
use log::{info, warn};

use super::{LatestAggregate, RoundAggregate, Strategy};
use crate::{
    AggregationErr, EvaluateRes, Failure, FitRes, Result, checkpoint::CheckpointStore,
    round_log::RoundLog, weighted,
};

/// Which tier of the hierarchy a `FedAvg` aggregates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// An edge node, a round without contributions republishes the previous aggregate.
    Edge,
    /// The root coordinator, a round without contributions yields no result.
    Root,
}

/// Sample-weighted federated averaging with an append-only checkpoint history.
pub struct FedAvg {
    tier: Tier,
    checkpoints: CheckpointStore,
    log: RoundLog,
    latest: LatestAggregate,
    last_round: Option<u64>,
    initial_checkpoint: Option<PathBuf>,
}

impl FedAvg {
    /// Creates a new `FedAvg` strategy.
    ///
    /// # Arguments
    /// * `tier` - The tier this strategy aggregates for.
    /// * `checkpoints` - Where round aggregates are persisted.
    /// * `log` - The node's round log.
    pub fn new(tier: Tier, checkpoints: CheckpointStore, log: RoundLog) -> Self {
        Self {
            tier,
            checkpoints,
            log,
            latest: LatestAggregate::new(),
            last_round: None,
            initial_checkpoint: None,
        }
    }

    /// Opens the checkpoint directory and round log of `node_name` and creates the strategy.
    ///
    /// # Arguments
    /// * `tier` - The tier this strategy aggregates for.
    /// * `node_name` - The node scope.
    /// * `model_path` - The root directory for checkpoints.
    /// * `log_path` - The root directory for round logs.
    pub fn open(tier: Tier, node_name: &str, model_path: &Path, log_path: &Path) -> io::Result<Self> {
        let checkpoints = CheckpointStore::open(model_path, node_name)?;
        let log = RoundLog::open(log_path, node_name)?;
        Ok(Self::new(tier, checkpoints, log))
    }

    /// Seeds the first round from an existing checkpoint file.
    pub fn with_initial_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.initial_checkpoint = Some(path.into());
        self
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Returns a read handle to the most recent aggregate.
    pub fn latest(&self) -> LatestAggregate {
        self.latest.clone()
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn round_log(&self) -> &RoundLog {
        &self.log
    }

    fn check_round(&self, round: u64) -> Result<()> {
        match self.last_round {
            Some(last) if round <= last => Err(AggregationErr::StaleRound { round, last }),
            _ => Ok(()),
        }
    }

    /// Handles a round that produced no aggregate.
    fn empty_round(&self, round: u64) -> Result<Option<Parameters>> {
        match self.tier {
            Tier::Root => {
                info!("round {round}: no clients participated, no result");
                self.log.fit_no_result(round)?;
                Ok(None)
            }
            Tier::Edge => {
                let previous = self.latest.get();
                self.log
                    .fit_empty(round, previous.as_deref().map(RoundAggregate::round))?;

                Ok(previous.map(|aggregate| aggregate.params().clone()))
            }
        }
    }
}

impl Strategy for FedAvg {
    fn initial_parameters(&mut self) -> Result<Option<Parameters>> {
        let Some(path) = &self.initial_checkpoint else {
            return Ok(None);
        };

        let params = CheckpointStore::load(path)?;
        match &params {
            Some(params) => info!(
                "seeding from {} with {} arrays",
                path.display(),
                params.len()
            ),
            None => warn!("initial checkpoint {} doesn't exist", path.display()),
        }

        Ok(params)
    }

    fn aggregate_fit(
        &mut self,
        round: u64,
        results: Vec<FitRes>,
        failures: Vec<Failure>,
    ) -> Result<Option<Parameters>> {
        self.check_round(round)?;

        if !failures.is_empty() {
            warn!("round {round}: {} client(s) failed", failures.len());
            self.log.fit_failures(round, &failures)?;
        }

        let Some(params) = weighted::weighted_average(round, &results)? else {
            self.last_round = Some(round);
            return self.empty_round(round);
        };

        let samples = results.iter().map(|res| res.samples).sum();
        let path = self.checkpoints.save(round, &params)?;

        let aggregate = self
            .latest
            .publish(RoundAggregate::new(round, params, samples));
        self.last_round = Some(round);

        let shapes = params::shapes(aggregate.params());
        if let Err(e) = self.log.fit_round(round, &shapes, samples, &path) {
            warn!("round {round}: cannot record the aggregate in the round log: {e}");
        }

        info!(
            "round {round}: aggregated {} contribution(s), {samples} samples",
            results.len()
        );

        Ok(Some(aggregate.params().clone()))
    }

    fn aggregate_evaluate(
        &mut self,
        round: u64,
        results: Vec<EvaluateRes>,
        failures: Vec<Failure>,
    ) -> Result<Option<f32>> {
        if !failures.is_empty() {
            self.log.evaluate_failures(&failures)?;
        }

        let loss = weighted::weighted_loss(&results);
        if loss.is_none() && self.tier == Tier::Root {
            info!("round {round}: no clients participated in evaluation");
        }

        self.log.evaluate_round(round, loss)?;
        Ok(loss)
    }
}

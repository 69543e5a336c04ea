//! Append-only text logs of a node scope.
//!
//! * `fit.log` - per round failures, aggregated shapes, total samples and checkpoint path.
//! * `evaluate.log` - per round evaluation failures and weighted loss.
//! * `aggregation.log` - the calls the tier above made to this node's proxy client.

use std::{
    fmt::Write as _,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::Failure;

/// The round log files of one node scope.
#[derive(Debug, Clone)]
pub struct RoundLog {
    fit: PathBuf,
    evaluate: PathBuf,
    aggregation: PathBuf,
}

impl RoundLog {
    /// Opens (creating the directory if needed) the logs under `log_path/node_name`.
    ///
    /// # Arguments
    /// * `log_path` - The root directory for all logs.
    /// * `node_name` - The node scope.
    pub fn open(log_path: &Path, node_name: &str) -> io::Result<Self> {
        let dir = log_path.join(node_name);
        fs::create_dir_all(&dir)?;

        Ok(Self {
            fit: dir.join("fit.log"),
            evaluate: dir.join("evaluate.log"),
            aggregation: dir.join("aggregation.log"),
        })
    }

    pub fn fit_path(&self) -> &Path {
        &self.fit
    }

    pub fn evaluate_path(&self) -> &Path {
        &self.evaluate
    }

    pub fn aggregation_path(&self) -> &Path {
        &self.aggregation
    }

    /// Records the clients that failed to contribute to a fit round.
    pub fn fit_failures(&self, round: u64, failures: &[Failure]) -> io::Result<()> {
        Self::append(
            &self.fit,
            &format!("[ERROR] Round {round} failed for clients: {}\n", join(failures)),
        )
    }

    /// Records a completed fit round.
    ///
    /// # Arguments
    /// * `round` - The round number.
    /// * `shapes` - The shapes of the aggregated arrays.
    /// * `samples` - The total amount of contributing samples.
    /// * `checkpoint` - Where the aggregate was persisted.
    pub fn fit_round(
        &self,
        round: u64,
        shapes: &[Vec<usize>],
        samples: u64,
        checkpoint: &Path,
    ) -> io::Result<()> {
        let mut record = String::new();
        let _ = writeln!(record, "Round {round} aggregated weights shapes: {shapes:?}");
        let _ = writeln!(record, "Round {round} total samples: {samples}");
        let _ = writeln!(
            record,
            "Round {round} model saved to {}",
            checkpoint.display()
        );

        Self::append(&self.fit, &record)
    }

    /// Records a fit round without contributions.
    ///
    /// # Arguments
    /// * `round` - The round number.
    /// * `previous` - The round whose aggregate is republished, if any.
    pub fn fit_empty(&self, round: u64, previous: Option<u64>) -> io::Result<()> {
        let record = match previous {
            Some(previous) => format!(
                "Round {round} had no contributions, republishing round {previous} aggregate\n"
            ),
            None => format!("Round {round} had no contributions and there is no aggregate yet\n"),
        };

        Self::append(&self.fit, &record)
    }

    /// Records a root round without contributions.
    pub fn fit_no_result(&self, round: u64) -> io::Result<()> {
        Self::append(
            &self.fit,
            &format!("Round {round} had no contributions, no result\n"),
        )
    }

    /// Records the clients that failed to contribute to an evaluation round.
    pub fn evaluate_failures(&self, failures: &[Failure]) -> io::Result<()> {
        Self::append(
            &self.evaluate,
            &format!("[ERROR] Evaluation failed for clients: {}\n", join(failures)),
        )
    }

    /// Records the weighted loss of an evaluation round.
    pub fn evaluate_round(&self, round: u64, loss: Option<f32>) -> io::Result<()> {
        let loss = match loss {
            Some(loss) => loss.to_string(),
            None => "None".to_string(),
        };

        Self::append(
            &self.evaluate,
            &format!("Round {round} aggregated evaluation loss: {loss}\n"),
        )
    }

    /// Records a call made by the tier above to this node's proxy client.
    pub fn client_call(&self, line: &str) -> io::Result<()> {
        Self::append(&self.aggregation, &format!("[CLIENT] {line}\n"))
    }

    fn append(path: &Path, record: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(record.as_bytes())
    }
}

fn join(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(Failure::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_appended_per_round() {
        let root = tempfile::tempdir().unwrap();
        let log = RoundLog::open(root.path(), "node-2").unwrap();

        let failures = [Failure {
            client: "c1".into(),
            reason: "connection reset".into(),
        }];

        log.fit_failures(1, &failures).unwrap();
        log.fit_round(1, &[vec![2, 3], vec![3]], 40, Path::new("ckpt/round_1"))
            .unwrap();
        log.fit_empty(2, Some(1)).unwrap();

        let text = fs::read_to_string(log.fit_path()).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(
            lines,
            [
                "[ERROR] Round 1 failed for clients: c1: connection reset",
                "Round 1 aggregated weights shapes: [[2, 3], [3]]",
                "Round 1 total samples: 40",
                "Round 1 model saved to ckpt/round_1",
                "Round 2 had no contributions, republishing round 1 aggregate",
            ]
        );
    }

    #[test]
    fn evaluation_and_client_calls_go_to_their_own_files() {
        let root = tempfile::tempdir().unwrap();
        let log = RoundLog::open(root.path(), "root").unwrap();

        log.evaluate_round(1, Some(0.5)).unwrap();
        log.evaluate_round(2, None).unwrap();
        log.client_call("fit called").unwrap();

        let evaluate = fs::read_to_string(log.evaluate_path()).unwrap();
        assert_eq!(
            evaluate,
            "Round 1 aggregated evaluation loss: 0.5\nRound 2 aggregated evaluation loss: None\n"
        );

        let aggregation = fs::read_to_string(log.aggregation_path()).unwrap();
        assert_eq!(aggregation, "[CLIENT] fit called\n");
        assert!(!log.fit_path().exists());
    }
}

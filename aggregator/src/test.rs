#![cfg(test)]

use std::fs;

use comms::Parameters;
use ndarray::{ArrayD, IxDyn, array};
use tempfile::TempDir;
use tokio::io;

use crate::{
    AggregationErr, Client, ClientErr, EvaluateRes, FedAvg, FitRes, ProxyClient, RemoteClient,
    RoundConfig, RoundDriver, Tier, checkpoint::CheckpointStore, client::ClientResult, serve,
};

/// A leaf that adds `delta` to every parameter it is asked to fit.
struct Leaf {
    id: String,
    delta: f32,
    samples: u64,
    loss: Option<f32>,
    broken: bool,
}

impl Leaf {
    fn new(id: &str, delta: f32, samples: u64, loss: Option<f32>) -> Self {
        Self {
            id: id.to_string(),
            delta,
            samples,
            loss,
            broken: false,
        }
    }

    fn broken(id: &str) -> Self {
        Self {
            broken: true,
            ..Self::new(id, 0.0, 0, None)
        }
    }
}

#[async_trait::async_trait]
impl Client for Leaf {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_parameters(&mut self) -> ClientResult<Parameters> {
        Ok(vec![ArrayD::zeros(IxDyn(&[2]))])
    }

    async fn fit(&mut self, _round: u64, params: Parameters) -> ClientResult<FitRes> {
        if self.broken {
            return Err(ClientErr::Remote("out of memory".into()));
        }

        let delta = self.delta;
        Ok(FitRes {
            params: params.into_iter().map(|arr| arr + delta).collect(),
            samples: self.samples,
        })
    }

    async fn evaluate(
        &mut self,
        _round: u64,
        _params: Parameters,
    ) -> ClientResult<Option<EvaluateRes>> {
        if self.broken {
            return Err(ClientErr::Remote("out of memory".into()));
        }

        Ok(self.loss.map(|loss| EvaluateRes {
            loss,
            samples: self.samples,
        }))
    }
}

fn fedavg(root: &TempDir, tier: Tier, node: &str) -> FedAvg {
    FedAvg::open(
        tier,
        node,
        &root.path().join("models"),
        &root.path().join("logs"),
    )
    .unwrap()
}

fn rounds(num_rounds: u64, min_available_clients: usize) -> RoundConfig {
    RoundConfig {
        num_rounds,
        min_available_clients,
        seed: Some(1),
        ..Default::default()
    }
}

/// Serves `client` on one end of an in-memory channel and returns a remote handle to it.
fn remote(mut client: impl Client + 'static, id: &str) -> Box<dyn Client> {
    let (near, far) = io::duplex(1 << 16);

    let (rx, tx) = io::split(far);
    let (rx, tx) = comms::channel(rx, tx);
    tokio::spawn(async move { serve(&mut client, rx, tx).await.unwrap() });

    let (rx, tx) = io::split(near);
    let (rx, tx) = comms::channel(rx, tx);
    Box::new(RemoteClient::new(id, rx, tx))
}

#[tokio::test(flavor = "multi_thread")]
async fn rounds_average_by_samples_and_persist_each_round() {
    let root = tempfile::tempdir().unwrap();
    let mut driver = RoundDriver::new(fedavg(&root, Tier::Edge, "node-1"), rounds(2, 2));

    driver.add_client(Box::new(Leaf::new("c1", 1.0, 10, Some(1.0))));
    driver.add_client(Box::new(Leaf::new("c2", 3.0, 30, Some(0.0))));

    let params = driver.run().await.unwrap();
    assert_eq!(params, vec![array![5.0, 5.0].into_dyn()]);

    let fedavg = driver.into_strategy();
    let first = CheckpointStore::load(&fedavg.checkpoints().path_for(1))
        .unwrap()
        .unwrap();
    assert_eq!(first, vec![array![2.5, 2.5].into_dyn()]);

    let aggregate = fedavg.latest().get().unwrap();
    assert_eq!(aggregate.round(), 2);
    assert_eq!(aggregate.samples(), 40);

    let evaluate = fs::read_to_string(fedavg.round_log().evaluate_path()).unwrap();
    assert_eq!(
        evaluate,
        "Round 1 aggregated evaluation loss: 0.25\nRound 2 aggregated evaluation loss: 0.25\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_client_is_recorded_and_skipped() {
    let root = tempfile::tempdir().unwrap();
    let mut driver = RoundDriver::new(fedavg(&root, Tier::Edge, "node-1"), rounds(1, 2));

    driver.add_client(Box::new(Leaf::new("c1", 2.0, 8, Some(0.5))));
    driver.add_client(Box::new(Leaf::broken("c2")));

    let params = driver.run().await.unwrap();
    assert_eq!(params, vec![array![2.0, 2.0].into_dyn()]);

    let fedavg = driver.into_strategy();
    let fit = fs::read_to_string(fedavg.round_log().fit_path()).unwrap();
    assert!(fit.contains("[ERROR] Round 1 failed for clients: c2: client reported: out of memory"));
    assert!(fit.contains("Round 1 total samples: 8"));

    let evaluate = fs::read_to_string(fedavg.round_log().evaluate_path()).unwrap();
    assert!(evaluate.contains("[ERROR] Evaluation failed for clients: c2"));
    assert!(evaluate.contains("Round 1 aggregated evaluation loss: 0.5"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rounds_need_the_minimum_amount_of_clients() {
    let root = tempfile::tempdir().unwrap();
    let mut driver = RoundDriver::new(fedavg(&root, Tier::Root, "root"), rounds(1, 3));
    driver.add_client(Box::new(Leaf::new("c1", 1.0, 1, None)));

    let err = driver.run().await.unwrap_err();
    assert!(matches!(
        err,
        AggregationErr::NotEnoughClients {
            available: 1,
            required: 3
        }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn initial_checkpoint_seeds_the_first_round() {
    let root = tempfile::tempdir().unwrap();
    let seed = root.path().join("seed.safetensors");
    let store = CheckpointStore::open(root.path(), "seed").unwrap();
    let path = store.save(1, &[array![10.0, 20.0].into_dyn()]).unwrap();
    fs::rename(path, &seed).unwrap();

    let fedavg = fedavg(&root, Tier::Root, "root").with_initial_checkpoint(&seed);
    let mut driver = RoundDriver::new(fedavg, rounds(1, 1));
    driver.add_client(Box::new(Leaf::new("c1", 1.0, 4, None)));

    let params = driver.run().await.unwrap();
    assert_eq!(params, vec![array![11.0, 21.0].into_dyn()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn edge_aggregate_reaches_the_root_through_the_proxy() {
    let root = tempfile::tempdir().unwrap();

    let edge = fedavg(&root, Tier::Edge, "node-1");
    let proxy = ProxyClient::new("node-1", edge.latest(), edge.round_log().clone());
    let mut edge = RoundDriver::new(edge, rounds(1, 2));

    edge.add_client(remote(Leaf::new("c1", 1.0, 10, Some(1.0)), "c1"));
    edge.add_client(remote(Leaf::new("c2", 3.0, 30, Some(0.0)), "c2"));

    let edge_params = edge.run().await.unwrap();
    assert_eq!(edge_params, vec![array![2.5, 2.5].into_dyn()]);

    let mut coordinator = RoundDriver::new(fedavg(&root, Tier::Root, "root"), rounds(1, 1));
    coordinator.add_client(remote(proxy, "node-1"));

    let root_params = coordinator.run().await.unwrap();
    assert_eq!(root_params, edge_params);

    let coordinator = coordinator.into_strategy();
    let aggregate = coordinator.latest().get().unwrap();
    assert_eq!(aggregate.samples(), 40);

    let evaluate = fs::read_to_string(coordinator.round_log().evaluate_path()).unwrap();
    assert_eq!(evaluate, "Round 1 aggregated evaluation loss: None\n");

    let calls = fs::read_to_string(edge.into_strategy().round_log().aggregation_path()).unwrap();
    let calls: Vec<_> = calls.lines().collect();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], "[CLIENT] get_parameters called on the edge server.");
    assert!(calls[1].starts_with("[CLIENT] fit called on the edge server for round 1."));
    assert!(calls[2].starts_with("[CLIENT] evaluate called on the edge server for round 1."));
}

#[tokio::test(flavor = "multi_thread")]
async fn edge_without_an_aggregate_yet_does_not_stall_the_root() {
    let root = tempfile::tempdir().unwrap();

    let ahead = fedavg(&root, Tier::Edge, "edge-1");
    let lagging = fedavg(&root, Tier::Edge, "edge-2");
    let ahead_proxy = ProxyClient::new("edge-1", ahead.latest(), ahead.round_log().clone());
    let lagging_proxy = ProxyClient::new("edge-2", lagging.latest(), lagging.round_log().clone());

    let mut edge = RoundDriver::new(ahead, rounds(1, 1));
    edge.add_client(Box::new(Leaf::new("c1", 2.0, 10, None)));
    let edge_params = edge.run().await.unwrap();

    let mut coordinator = RoundDriver::new(fedavg(&root, Tier::Root, "root"), rounds(1, 2));
    coordinator.add_client(remote(ahead_proxy, "edge-1"));
    coordinator.add_client(remote(lagging_proxy, "edge-2"));

    let root_params = coordinator.run().await.unwrap();
    assert_eq!(root_params, edge_params);
    assert_eq!(root_params, vec![array![2.0, 2.0].into_dyn()]);

    let aggregate = coordinator.into_strategy().latest().get().unwrap();
    assert_eq!(aggregate.samples(), 10);
}

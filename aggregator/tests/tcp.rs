use aggregator::{
    Client, EvaluateRes, FedAvg, FitRes, RemoteClient, RoundConfig, RoundDriver, Tier,
    client::ClientResult, serve,
};
use comms::Parameters;
use ndarray::array;
use tokio::net::{TcpListener, TcpStream};

/// A leaf that always answers with the same vector.
struct Constant {
    params: Parameters,
    samples: u64,
}

#[async_trait::async_trait]
impl Client for Constant {
    fn id(&self) -> &str {
        "constant"
    }

    async fn get_parameters(&mut self) -> ClientResult<Parameters> {
        Ok(self.params.clone())
    }

    async fn fit(&mut self, _round: u64, _params: Parameters) -> ClientResult<FitRes> {
        Ok(FitRes {
            params: self.params.clone(),
            samples: self.samples,
        })
    }

    async fn evaluate(
        &mut self,
        _round: u64,
        _params: Parameters,
    ) -> ClientResult<Option<EvaluateRes>> {
        Ok(Some(EvaluateRes {
            loss: 0.75,
            samples: self.samples,
        }))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn leaves_connected_over_tcp_are_averaged() {
    let root = tempfile::tempdir().unwrap();
    let list = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = list.local_addr().unwrap();

    let leaves: Vec<_> = [(1.0, 1), (4.0, 2)]
        .into_iter()
        .map(|(value, samples)| {
            tokio::spawn(async move {
                let stream = TcpStream::connect(addr).await.unwrap();
                let (rx, tx) = stream.into_split();
                let (rx, tx) = comms::channel(rx, tx);

                let mut leaf = Constant {
                    params: vec![array![[value, -value]].into_dyn()],
                    samples,
                };
                serve(&mut leaf, rx, tx).await.unwrap();
            })
        })
        .collect();

    let fedavg = FedAvg::open(
        Tier::Root,
        "root",
        &root.path().join("models"),
        &root.path().join("logs"),
    )
    .unwrap();

    let config = RoundConfig {
        num_rounds: 2,
        min_available_clients: 2,
        ..Default::default()
    };
    let mut driver = RoundDriver::new(fedavg, config);

    while driver.available() < 2 {
        let (stream, peer) = list.accept().await.unwrap();
        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        driver.add_client(Box::new(RemoteClient::new(peer.to_string(), rx, tx)));
    }

    let params = driver.run().await.unwrap();
    assert_eq!(params, vec![array![[3.0, -3.0]].into_dyn()]);

    for leaf in leaves {
        leaf.await.unwrap();
    }

    let fedavg = driver.into_strategy();
    assert!(fedavg.checkpoints().path_for(1).exists());
    assert!(fedavg.checkpoints().path_for(2).exists());
}

mod state;

use std::time::Duration;

use futures::future;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};

pub use state::{NodeState, NodeStatus};
use state::{AllocatorState, Commit, Placement};

use crate::{AllocError, Prober, Provisioner, Result};

pub const NEW_NODE: &str = "New edge server allocated.";
pub const EXISTING_NODE: &str = "Client allocated to existing edge server.";
pub const ALREADY_ALLOCATED: &str = "Client already allocated to edge server.";

/// Placeholder of `AllocatorConfig::node_address` replaced by the node id.
pub const NODE_PLACEHOLDER: &str = "{node}";

/// The time a liveness probe may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeBudget {
    pub per_attempt: Duration,
    pub budget: Duration,
}

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// The maximum amount of clients per node.
    pub capacity: usize,
    /// The address of a node, with `{node}` standing for its id.
    pub node_address: String,
    /// Budget of the probes made while allocating.
    pub probe: ProbeBudget,
    /// Budget of the probes made by the health monitor.
    pub health: ProbeBudget,
}

/// The node a client was assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    #[serde(rename = "edge_server")]
    pub node: String,
    pub message: &'static str,
}

impl Allocation {
    fn new(node: String, message: &'static str) -> Self {
        Self { node, message }
    }
}

/// A slot held on a node by an allocation in flight.
///
/// Dropping it before `commit`, e.g. when the allocating request is abandoned, gives the
/// slot back. A minted node left without reservations is then up to the health check.
struct Reservation<'a> {
    state: &'a Mutex<AllocatorState>,
    node: String,
    held: bool,
}

impl<'a> Reservation<'a> {
    fn new(state: &'a Mutex<AllocatorState>, node: String) -> Self {
        Self {
            state,
            node,
            held: true,
        }
    }

    fn commit(mut self, client: &str) -> Commit {
        self.held = false;
        self.state.lock().commit(client, &self.node)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.held {
            debug!("releasing the slot reserved on {}", self.node);
            self.state.lock().release(&self.node);
        }
    }
}

/// Assigns clients to capacity-bounded edge nodes, provisioning and evicting nodes as needed.
///
/// A single lock guards the bookkeeping and it's never held while probing or provisioning.
pub struct Allocator<P, V> {
    prober: P,
    provisioner: V,
    config: AllocatorConfig,
    state: Mutex<AllocatorState>,
}

impl<P, V> Allocator<P, V>
where
    P: Prober + Sync,
    V: Provisioner + Sync,
{
    /// Creates a new `Allocator`.
    ///
    /// # Arguments
    /// * `prober` - Decides whether a node is alive.
    /// * `provisioner` - Starts and stops the nodes' backing processes.
    /// * `config` - Capacity, addressing and probe budgets.
    ///
    /// # Returns
    /// The allocator, or a `Config` error if the capacity is zero or the address template
    /// doesn't mention the node.
    pub fn new(prober: P, provisioner: V, config: AllocatorConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(AllocError::Config(
                "max_clients_per_edge_server must be greater than 0".into(),
            ));
        }

        if !config.node_address.contains(NODE_PLACEHOLDER) {
            return Err(AllocError::Config(format!(
                "node_address ({}) must contain {NODE_PLACEHOLDER}",
                config.node_address
            )));
        }

        Ok(Self {
            prober,
            provisioner,
            config,
            state: Mutex::new(AllocatorState::default()),
        })
    }

    /// Returns the address the node with id `node` is reached at.
    pub fn address_of(&self, node: &str) -> String {
        self.config.node_address.replace(NODE_PLACEHOLDER, node)
    }

    /// Assigns `client` to a live node.
    ///
    /// A client whose node is still alive gets the same node back. A client whose node died
    /// has the node evicted and is placed again.
    ///
    /// # Arguments
    /// * `client` - The client's id.
    ///
    /// # Returns
    /// The assignment, a retryable `Unavailable` error if the target node didn't answer, or
    /// a fatal `Provision` error if a new node couldn't be started.
    pub async fn allocate(&self, client: &str) -> Result<Allocation> {
        let assigned = self.state.lock().assigned(client).map(str::to_string);

        if let Some(node) = assigned {
            if self.probe(&node, self.config.probe).await {
                return Ok(Allocation::new(node, ALREADY_ALLOCATED));
            }

            warn!("{node} holding {client} is unreachable");
            self.evict(&node).await;
        }

        let placement = self.state.lock().place(client, self.config.capacity);
        let (node, minted) = match placement {
            Placement::Assigned(node) => return Ok(Allocation::new(node, ALREADY_ALLOCATED)),
            Placement::Reserved(node) => (node, false),
            Placement::Minted(node) => (node, true),
        };

        let reservation = Reservation::new(&self.state, node.clone());

        if minted {
            info!("provisioning {node} for {client}");

            if let Err(source) = self.provisioner.start(&node).await {
                error!("cannot start {node}: {source}");
                self.state.lock().evict(&node);
                return Err(AllocError::Provision { node, source });
            }
        }

        if !self.probe(&node, self.config.probe).await {
            warn!("{node} didn't answer while allocating {client}");
            self.evict(&node).await;
            return Err(AllocError::Unavailable { node });
        }

        let allocation = match reservation.commit(client) {
            Commit::Joined if minted => Allocation::new(node, NEW_NODE),
            Commit::Joined => Allocation::new(node, EXISTING_NODE),
            Commit::Already(existing) => Allocation::new(existing, ALREADY_ALLOCATED),
            Commit::Gone => return Err(AllocError::Unavailable { node }),
        };

        info!("{client} allocated to {}", allocation.node);
        debug!("node table: {:?}", self.status());
        Ok(allocation)
    }

    /// Removes `node` from the table and stops its backing process.
    ///
    /// Evicting a node that isn't registered does nothing.
    pub async fn evict(&self, node: &str) {
        let removed = self.state.lock().evict(node);
        let Some(record) = removed else {
            return;
        };

        warn!("evicted {node}, released clients {:?}", record.clients());

        if let Err(e) = self.provisioner.stop(node).await {
            warn!("cannot stop {node}: {e}");
        }
    }

    /// Returns a snapshot of the node table, oldest node first.
    pub fn status(&self) -> Vec<NodeStatus> {
        self.state.lock().status()
    }

    /// Probes every alive node, and every provisioning node no allocation is waiting on,
    /// with the health budget. Unreachable nodes are evicted, provisioning nodes that answer
    /// become alive.
    ///
    /// # Returns
    /// The evicted nodes.
    pub async fn sweep(&self) -> Vec<String> {
        let nodes = self.state.lock().unattended_nodes();

        let probes = nodes.into_iter().map(|node| async move {
            let up = self.probe(&node, self.config.health).await;
            (node, up)
        });

        let mut evicted = Vec::new();
        for (node, up) in future::join_all(probes).await {
            if up {
                self.state.lock().promote(&node);
                continue;
            }

            warn!("{node} failed its health check");
            self.evict(&node).await;
            evicted.push(node);
        }

        evicted
    }

    /// Sweeps the node table every `period`, forever.
    pub async fn monitor(&self, period: Duration) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = self.sweep().await;
            if !evicted.is_empty() {
                info!("health check evicted {evicted:?}");
            }
        }
    }

    /// Stops every registered node and empties the table.
    pub async fn shutdown(&self) {
        let nodes = self.state.lock().drain();

        for node in nodes {
            info!("stopping {node}");
            if let Err(e) = self.provisioner.stop(&node).await {
                warn!("cannot stop {node}: {e}");
            }
        }
    }

    async fn probe(&self, node: &str, budget: ProbeBudget) -> bool {
        let addr = self.address_of(node);
        self.prober
            .is_reachable(&addr, budget.per_attempt, budget.budget)
            .await
    }
}

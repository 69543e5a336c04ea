use std::collections::HashMap;

use serde::Serialize;

/// Lifecycle of a node. A dead node is removed from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Minted, its backing process may not be answering yet.
    Provisioning,
    /// Answered a liveness probe.
    Alive,
}

/// A snapshot of one node of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub id: String,
    pub state: NodeState,
    /// The assigned clients in join order.
    pub clients: Vec<String>,
    /// Slots held by allocations still probing the node.
    pub reserved: usize,
}

#[derive(Debug)]
pub(super) struct NodeRecord {
    seq: u64,
    state: NodeState,
    clients: Vec<String>,
    reserved: usize,
}

impl NodeRecord {
    fn occupancy(&self) -> usize {
        self.clients.len() + self.reserved
    }

    pub fn clients(&self) -> &[String] {
        &self.clients
    }
}

/// Where `place` put a client.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Placement {
    /// The client already has a node.
    Assigned(String),
    /// A slot was reserved on the current node.
    Reserved(String),
    /// A new node was registered with a slot reserved for the client.
    Minted(String),
}

/// The outcome of turning a reservation into a membership.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Commit {
    Joined,
    /// A concurrent allocation of the same client won, the reservation was released.
    Already(String),
    /// The node was evicted in the meantime.
    Gone,
}

/// The bookkeeping of the allocator, only ever touched under its lock.
#[derive(Debug, Default)]
pub(super) struct AllocatorState {
    clients: HashMap<String, String>,
    nodes: HashMap<String, NodeRecord>,
    current: Option<String>,
    last_seq: u64,
}

impl AllocatorState {
    pub fn assigned(&self, client: &str) -> Option<&str> {
        self.clients.get(client).map(String::as_str)
    }

    /// Reserves a slot for `client` on the current node, minting a new one if there is
    /// no current node or it is full.
    pub fn place(&mut self, client: &str, capacity: usize) -> Placement {
        if let Some(node) = self.clients.get(client) {
            return Placement::Assigned(node.clone());
        }

        if let Some(id) = &self.current {
            if let Some(node) = self.nodes.get_mut(id) {
                if node.occupancy() < capacity {
                    node.reserved += 1;
                    return Placement::Reserved(id.clone());
                }
            }
        }

        self.last_seq += 1;
        let id = format!("node-{}", self.last_seq);

        self.nodes.insert(
            id.clone(),
            NodeRecord {
                seq: self.last_seq,
                state: NodeState::Provisioning,
                clients: Vec::new(),
                reserved: 1,
            },
        );
        self.current = Some(id.clone());

        Placement::Minted(id)
    }

    /// Turns the reservation of `client` on `node` into a membership and marks the node alive.
    pub fn commit(&mut self, client: &str, node: &str) -> Commit {
        let Some(record) = self.nodes.get_mut(node) else {
            return Commit::Gone;
        };

        record.reserved = record.reserved.saturating_sub(1);
        record.state = NodeState::Alive;

        if let Some(existing) = self.clients.get(client) {
            return Commit::Already(existing.clone());
        }

        record.clients.push(client.to_string());
        self.clients.insert(client.to_string(), node.to_string());
        Commit::Joined
    }

    /// Gives back a slot reserved on `node` by an allocation that never committed.
    pub fn release(&mut self, node: &str) {
        if let Some(record) = self.nodes.get_mut(node) {
            record.reserved = record.reserved.saturating_sub(1);
        }
    }

    /// Marks a node that answered a health check as alive.
    pub fn promote(&mut self, node: &str) {
        if let Some(record) = self.nodes.get_mut(node) {
            record.state = NodeState::Alive;
        }
    }

    /// Removes `node` and releases every client mapped to it.
    ///
    /// # Returns
    /// The removed record, or `None` if the node wasn't registered.
    pub fn evict(&mut self, node: &str) -> Option<NodeRecord> {
        let record = self.nodes.remove(node)?;

        for client in &record.clients {
            self.clients.remove(client);
        }

        if self.current.as_deref() == Some(node) {
            self.current = None;
        }

        Some(record)
    }

    /// Returns the nodes the health check should probe, oldest first.
    ///
    /// Alive nodes are always checked. A provisioning node is only checked once no
    /// allocation is waiting on it, as the allocations that reserved it were abandoned.
    pub fn unattended_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<_> = self
            .nodes
            .iter()
            .filter(|(_, record)| record.state == NodeState::Alive || record.reserved == 0)
            .map(|(id, record)| (record.seq, id.clone()))
            .collect();

        nodes.sort_unstable();
        nodes.into_iter().map(|(_, id)| id).collect()
    }

    /// Returns the node table ordered by node age.
    pub fn status(&self) -> Vec<NodeStatus> {
        let mut nodes: Vec<_> = self.nodes.iter().collect();
        nodes.sort_unstable_by_key(|(_, record)| record.seq);

        nodes
            .into_iter()
            .map(|(id, record)| NodeStatus {
                id: id.clone(),
                state: record.state,
                clients: record.clients.clone(),
                reserved: record.reserved,
            })
            .collect()
    }

    /// Empties the table, returning every node that was registered, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        let nodes = self.status().into_iter().map(|node| node.id).collect();

        self.clients.clear();
        self.nodes.clear();
        self.current = None;
        nodes
    }
}

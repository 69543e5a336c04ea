//! Assignment of training clients to capacity-bounded edge nodes.
//!
//! The [`Allocator`] provisions edge nodes on demand through a [`Provisioner`], checks them
//! with a [`Prober`] and evicts the ones that stop answering. The [`api`] module exposes it
//! over HTTP.

pub mod allocator;
pub mod api;
pub mod configs;
pub mod error;
pub mod prober;
pub mod provisioner;

pub use allocator::{Allocation, Allocator, AllocatorConfig, NodeState, NodeStatus, ProbeBudget};
pub use error::{AllocError, ProvisionErr, Result};
pub use prober::{Prober, TcpProber};
pub use provisioner::{Provisioner, ScriptProvisioner};

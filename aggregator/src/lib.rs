//! Federated averaging for one tier of the training hierarchy.
//!
//! An edge node runs a [`RoundDriver`] over its leaf clients with an edge [`FedAvg`] strategy,
//! then serves the last aggregate upward through a [`ProxyClient`]. The root coordinator runs
//! the same driver over its edge nodes with the root strategy.

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod results;
pub mod round_log;
pub mod rounds;
pub mod strategy;
pub mod weighted;

#[cfg(test)]
mod test;

pub use client::{Client, ProxyClient, RemoteClient, serve};
pub use error::{AggregationErr, ClientErr, Result};
pub use results::{EvaluateRes, Failure, FitRes};
pub use rounds::{RoundConfig, RoundDriver};
pub use strategy::{FedAvg, LatestAggregate, RoundAggregate, Strategy, Tier};

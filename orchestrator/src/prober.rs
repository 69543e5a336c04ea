use std::time::Duration;

use log::{debug, trace};
use tokio::{
    net::TcpStream,
    time::{self, Instant},
};

/// Decides whether a node answers within a bounded amount of time.
#[allow(unused)]
#[trait_variant::make(Prober: Send)]
pub trait ProberTemplate {
    /// Repeatedly tries to reach `addr` until one attempt succeeds or the budget runs out.
    ///
    /// # Arguments
    /// * `addr` - The `host:port` of the node.
    /// * `per_attempt` - The timeout of a single attempt.
    /// * `budget` - The total time the probe may take.
    ///
    /// # Returns
    /// `true` on the first successful attempt, `false` once the budget elapsed. Failures are
    /// never raised.
    async fn is_reachable(&self, addr: &str, per_attempt: Duration, budget: Duration) -> bool;
}

/// Probes a node by opening a TCP connection to it.
#[derive(Debug, Clone)]
pub struct TcpProber {
    backoff: Duration,
}

impl TcpProber {
    /// Creates a new `TcpProber`.
    ///
    /// # Arguments
    /// * `backoff` - The pause between two failed attempts.
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }
}

impl Prober for TcpProber {
    async fn is_reachable(&self, addr: &str, per_attempt: Duration, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        let mut attempt = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("{addr} unreachable after {attempt} attempt(s)");
                return false;
            }

            attempt += 1;
            match time::timeout(per_attempt.min(remaining), TcpStream::connect(addr)).await {
                Ok(Ok(_)) => {
                    trace!("{addr} reachable at attempt {attempt}");
                    return true;
                }
                Ok(Err(e)) => trace!("attempt {attempt} to {addr} failed: {e}"),
                Err(_) => trace!("attempt {attempt} to {addr} timed out"),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            time::sleep(self.backoff.min(remaining)).await;
        }
    }
}

//! Simulated network with deterministic latency, packet loss, and partitions.

use crate::runner::NodeIndex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Number of validators in the network.
    pub num_validators: u32,
    /// Base one-way message latency.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Packet loss rate (0.0 - 1.0). Messages are dropped with this
    /// probability.
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            num_validators: 4,
            latency: Duration::from_millis(10),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
        }
    }
}

/// Simulated network for deterministic message delivery.
///
/// Supports:
/// - Configurable latency with jitter
/// - Packet loss (probabilistic message drops)
/// - Partitions (blocking communication between node pairs)
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    /// Partitioned node pairs. If (a, b) is in this set, messages from a to
    /// b are dropped. Directional: add both orders for a full partition.
    partitions: HashSet<(NodeIndex, NodeIndex)>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            partitions: HashSet::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn total_nodes(&self) -> usize {
        self.config.num_validators as usize
    }

    // ─── Partition Management ───

    pub fn is_partitioned(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.partitions.contains(&(from, to))
    }

    /// Block messages from `from` to `to` only.
    pub fn partition_unidirectional(&mut self, from: NodeIndex, to: NodeIndex) {
        self.partitions.insert((from, to));
    }

    /// Block messages between two nodes in both directions.
    pub fn partition_bidirectional(&mut self, a: NodeIndex, b: NodeIndex) {
        self.partitions.insert((a, b));
        self.partitions.insert((b, a));
    }

    /// Cut a node off from everyone.
    pub fn isolate_node(&mut self, node: NodeIndex) {
        for other in 0..self.config.num_validators {
            if other != node {
                self.partitions.insert((node, other));
                self.partitions.insert((other, node));
            }
        }
    }

    pub fn heal_bidirectional(&mut self, a: NodeIndex, b: NodeIndex) {
        self.partitions.remove(&(a, b));
        self.partitions.remove(&(b, a));
    }

    /// Restore full connectivity.
    pub fn heal_all(&mut self) {
        self.partitions.clear();
    }

    pub fn set_packet_loss_rate(&mut self, rate: f64) {
        self.config.packet_loss_rate = rate.clamp(0.0, 1.0);
    }

    // ─── Delivery Decision ───

    /// Whether a message from `from` to `to` is delivered, and with what
    /// latency. `None` means the message is dropped.
    pub fn should_deliver(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        rng: &mut ChaCha8Rng,
    ) -> Option<Duration> {
        if self.is_partitioned(from, to) {
            return None;
        }
        if self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate {
            return None;
        }
        Some(self.sample_latency(rng))
    }

    fn sample_latency(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.config.latency.as_secs_f64();
        let jitter_range = base * self.config.jitter_fraction;
        let jitter = if jitter_range > 0.0 {
            rng.gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.0001))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_latency_is_deterministic() {
        let network = SimulatedNetwork::new(NetworkConfig::default());
        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);
        assert_eq!(
            network.should_deliver(0, 1, &mut rng1),
            network.should_deliver(0, 1, &mut rng2)
        );
    }

    #[test]
    fn test_partition_blocks_delivery() {
        let mut network = SimulatedNetwork::new(NetworkConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        network.partition_bidirectional(0, 1);
        assert!(network.should_deliver(0, 1, &mut rng).is_none());
        assert!(network.should_deliver(1, 0, &mut rng).is_none());
        assert!(network.should_deliver(0, 2, &mut rng).is_some());

        network.heal_all();
        assert!(network.should_deliver(0, 1, &mut rng).is_some());
    }

    #[test]
    fn test_isolation() {
        let mut network = SimulatedNetwork::new(NetworkConfig::default());
        network.isolate_node(2);
        for other in [0u32, 1, 3] {
            assert!(network.is_partitioned(2, other));
            assert!(network.is_partitioned(other, 2));
        }
        assert!(!network.is_partitioned(0, 1));
    }

    #[test]
    fn test_full_packet_loss_drops_everything() {
        let network = SimulatedNetwork::new(NetworkConfig {
            packet_loss_rate: 1.0,
            ..Default::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..20 {
            assert!(network.should_deliver(0, 1, &mut rng).is_none());
        }
    }
}

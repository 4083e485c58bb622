//! Prometheus metrics for the node.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Registry};

/// Node-level counters and gauges, registered on the default registry.
pub struct NodeMetrics {
    /// Inbound frames that failed to decode.
    pub malformed_messages: IntCounter,
    /// Events dropped because the inbound queue was full.
    pub queue_full_drops: IntCounter,
    /// Finalized blocks dropped from the advisory stream.
    pub finalized_stream_drops: IntCounter,
    /// Blocks finalized since start.
    pub finalized_blocks: IntCounter,
    /// Height of the last finalized block.
    pub finalized_height: IntGauge,
    /// The local epoch.
    pub local_epoch: IntGauge,
    /// Transactions currently in the mempool.
    pub mempool_size: IntGauge,
}

impl NodeMetrics {
    fn register(registry: &Registry) -> Self {
        let malformed_messages = IntCounter::new(
            "tessera_malformed_messages_total",
            "Inbound frames that failed to decode",
        )
        .expect("valid metric");
        let queue_full_drops = IntCounter::new(
            "tessera_queue_full_drops_total",
            "Events dropped because the inbound queue was full",
        )
        .expect("valid metric");
        let finalized_stream_drops = IntCounter::new(
            "tessera_finalized_stream_drops_total",
            "Finalized blocks dropped from the advisory stream",
        )
        .expect("valid metric");
        let finalized_blocks = IntCounter::new(
            "tessera_finalized_blocks_total",
            "Blocks finalized since start",
        )
        .expect("valid metric");
        let finalized_height =
            IntGauge::new("tessera_finalized_height", "Height of the last finalized block")
                .expect("valid metric");
        let local_epoch =
            IntGauge::new("tessera_local_epoch", "The local epoch").expect("valid metric");
        let mempool_size = IntGauge::new(
            "tessera_mempool_size",
            "Transactions currently in the mempool",
        )
        .expect("valid metric");

        for collector in [
            Box::new(malformed_messages.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(queue_full_drops.clone()),
            Box::new(finalized_stream_drops.clone()),
            Box::new(finalized_blocks.clone()),
            Box::new(finalized_height.clone()),
            Box::new(local_epoch.clone()),
            Box::new(mempool_size.clone()),
        ] {
            // Double registration only happens in tests sharing the default
            // registry; ignore it.
            let _ = registry.register(collector);
        }

        Self {
            malformed_messages,
            queue_full_drops,
            finalized_stream_drops,
            finalized_blocks,
            finalized_height,
            local_epoch,
            mempool_size,
        }
    }
}

/// Process-wide metrics handle.
pub static METRICS: Lazy<NodeMetrics> =
    Lazy::new(|| NodeMetrics::register(prometheus::default_registry()));

/// Render the default registry in the Prometheus text format.
pub fn render() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder
        .encode(&prometheus::default_registry().gather(), &mut buffer)
        .is_err()
    {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

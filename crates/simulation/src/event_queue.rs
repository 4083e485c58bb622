//! Deterministic ordering key for the global event queue.

use std::time::Duration;
use tessera_core::EventPriority;

/// Orders events by (time, priority, insertion sequence).
///
/// Internal events scheduled "now" therefore run before any external input
/// at the same instant, preserving causality; the sequence number keeps
/// keys unique and FIFO within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let t = Duration::from_millis(10);
        let internal = EventKey {
            time: t,
            priority: EventPriority::Internal,
            sequence: 9,
        };
        let network = EventKey {
            time: t,
            priority: EventPriority::Network,
            sequence: 1,
        };
        let earlier = EventKey {
            time: Duration::from_millis(9),
            priority: EventPriority::Client,
            sequence: 100,
        };

        assert!(earlier < internal, "time dominates");
        assert!(internal < network, "priority breaks time ties");
    }
}

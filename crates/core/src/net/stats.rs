use std::fmt;

/// Counters kept by each role over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub send_failures: u64,
    pub state_packets_sent: u64,
    pub state_packets_applied: u64,
    pub stale_dropped: u64,
    pub evicted: u64,
    pub aged_out: u64,
    pub malformed_dropped: u64,
    pub implausible_dropped: u64,
    pub requests_denied: u64,
    pub freezes: u64,
}

impl SyncStats {
    pub fn dropped_total(&self) -> u64 {
        self.stale_dropped
            + self.evicted
            + self.aged_out
            + self.malformed_dropped
            + self.implausible_dropped
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} ({} state), received {}, applied {}, dropped {} \
             (stale {}, evicted {}, aged {}, malformed {}, implausible {}), \
             denied {}, freezes {}, send failures {}",
            self.messages_sent,
            self.state_packets_sent,
            self.messages_received,
            self.state_packets_applied,
            self.dropped_total(),
            self.stale_dropped,
            self.evicted,
            self.aged_out,
            self.malformed_dropped,
            self.implausible_dropped,
            self.requests_denied,
            self.freezes,
            self.send_failures,
        )
    }
}

use crate::health::HealthState;
use std::collections::VecDeque;
use std::time::Instant;

/// One recorded heartbeat: when it arrived and whatever metadata the agent
/// attached (resource usage, task in progress, etc).
#[derive(Debug, Clone)]
pub struct HeartbeatEntry {
    pub at: Instant,
    pub metadata: Option<serde_json::Value>,
}

/// Per-agent liveness bookkeeping: a bounded ring buffer of heartbeats plus
/// the interval/threshold used to classify health.
#[derive(Debug, Clone)]
pub struct HeartbeatRecord {
    history: VecDeque<HeartbeatEntry>,
    capacity: usize,
    pub interval_ms: u64,
    pub threshold: f64,
    pub last_health: HealthState,
}

impl HeartbeatRecord {
    pub fn new(capacity: usize, interval_ms: u64, threshold: f64) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            interval_ms,
            threshold,
            last_health: HealthState::Healthy,
        }
    }

    /// Appends one heartbeat, evicting the oldest entry if at capacity. O(1).
    pub fn record(&mut self, metadata: Option<serde_json::Value>) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(HeartbeatEntry { at: Instant::now(), metadata });
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.history.back().map(|e| e.at)
    }

    /// Derives current health from the age of the most recent heartbeat. An
    /// agent with no heartbeats yet is treated as freshly started (HEALTHY).
    pub fn health(&self) -> HealthState {
        match self.last_seen() {
            Some(last) => HealthState::from_age(last.elapsed().as_millis() as u64, self.interval_ms, self.threshold),
            None => HealthState::Healthy,
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &HeartbeatEntry> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_never_exceeds_capacity() {
        let mut r = HeartbeatRecord::new(3, 1000, 5.0);
        for _ in 0..10 {
            r.record(None);
        }
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn fresh_record_with_no_beats_is_healthy() {
        let r = HeartbeatRecord::new(10, 1000, 5.0);
        assert_eq!(r.health(), HealthState::Healthy);
    }
}

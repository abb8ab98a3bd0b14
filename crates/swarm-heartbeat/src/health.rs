use serde::Serialize;

/// Liveness classification derived from heartbeat age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Healthy,
    Degraded,
    Critical,
    Failed,
}

impl HealthState {
    /// `age` is time since the last recorded heartbeat; `interval_ms` and
    /// `threshold` come from the per-agent (or default) monitor config.
    pub fn from_age(age_ms: u64, interval_ms: u64, threshold: f64) -> Self {
        let interval_ms = interval_ms.max(1) as f64;
        let age_ms = age_ms as f64;
        if age_ms <= interval_ms {
            HealthState::Healthy
        } else if age_ms <= 2.0 * interval_ms {
            HealthState::Degraded
        } else if age_ms <= threshold * interval_ms {
            HealthState::Critical
        } else {
            HealthState::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "HEALTHY",
            HealthState::Degraded => "DEGRADED",
            HealthState::Critical => "CRITICAL",
            HealthState::Failed => "FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_thresholds_map_to_expected_states() {
        assert_eq!(HealthState::from_age(500, 1000, 5.0), HealthState::Healthy);
        assert_eq!(HealthState::from_age(1500, 1000, 5.0), HealthState::Degraded);
        assert_eq!(HealthState::from_age(4000, 1000, 5.0), HealthState::Critical);
        assert_eq!(HealthState::from_age(6000, 1000, 5.0), HealthState::Failed);
    }
}

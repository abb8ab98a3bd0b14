use serde::{Deserialize, Serialize};
use swarm_consensus::ConsensusConfig;
use swarm_heartbeat::HeartbeatConfig;
use swarm_hooks::HooksConfig;
use swarm_topology::TopologyKind;

/// Aggregates every subsystem's tunables into one configuration surface.
/// Loadable from TOML via `config::Config`, falling back to
/// the defaults documented per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub topology_kind: String,
    pub store_path: Option<String>,
    pub metrics_async: bool,
    pub metrics_queue_capacity: usize,
    pub hooks: HooksConfigDto,
    pub heartbeat: HeartbeatConfigDto,
    pub consensus: ConsensusConfigDto,
    pub bottleneck_interval_ms: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            topology_kind: "mesh".to_string(),
            store_path: None,
            metrics_async: true,
            metrics_queue_capacity: 10_000,
            hooks: HooksConfigDto::default(),
            heartbeat: HeartbeatConfigDto::default(),
            consensus: ConsensusConfigDto::default(),
            bottleneck_interval_ms: 60_000,
        }
    }
}

impl SwarmConfig {
    /// Loads layered configuration: built-in defaults, then an optional TOML
    /// file at `path` if it exists, then `SWARM_`-prefixed environment
    /// overrides.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            if std::path::Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }
        builder = builder.add_source(config::Environment::with_prefix("SWARM").separator("__"));
        builder.build()?.try_deserialize()
    }

    pub fn topology_kind(&self) -> TopologyKind {
        self.topology_kind.parse().unwrap_or(TopologyKind::Mesh)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfigDto {
    pub default_sync_timeout_ms: u64,
    pub default_async_timeout_ms: u64,
    pub async_concurrency: usize,
    pub graceful_degradation: bool,
    pub max_retries: u8,
}

impl Default for HooksConfigDto {
    fn default() -> Self {
        let d = HooksConfig::default();
        Self {
            default_sync_timeout_ms: d.default_sync_timeout_ms,
            default_async_timeout_ms: d.default_async_timeout_ms,
            async_concurrency: d.async_concurrency,
            graceful_degradation: d.graceful_degradation,
            max_retries: d.max_retries,
        }
    }
}

impl From<HooksConfigDto> for HooksConfig {
    fn from(dto: HooksConfigDto) -> Self {
        Self {
            default_sync_timeout_ms: dto.default_sync_timeout_ms,
            default_async_timeout_ms: dto.default_async_timeout_ms,
            async_concurrency: dto.async_concurrency,
            graceful_degradation: dto.graceful_degradation,
            max_retries: dto.max_retries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfigDto {
    pub interval_ms: u64,
    pub threshold: f64,
    pub ring_capacity: usize,
    pub sweep_interval_ms: u64,
}

impl Default for HeartbeatConfigDto {
    fn default() -> Self {
        let d = HeartbeatConfig::default();
        Self { interval_ms: d.interval_ms, threshold: d.threshold, ring_capacity: d.ring_capacity, sweep_interval_ms: d.sweep_interval_ms }
    }
}

impl From<HeartbeatConfigDto> for HeartbeatConfig {
    fn from(dto: HeartbeatConfigDto) -> Self {
        Self { interval_ms: dto.interval_ms, threshold: dto.threshold, ring_capacity: dto.ring_capacity, sweep_interval_ms: dto.sweep_interval_ms }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfigDto {
    pub election_timeout_base_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ConsensusConfigDto {
    fn default() -> Self {
        let d = ConsensusConfig::default();
        Self { election_timeout_base_ms: d.election_timeout_base_ms, heartbeat_interval_ms: d.heartbeat_interval_ms }
    }
}

impl From<ConsensusConfigDto> for ConsensusConfig {
    fn from(dto: ConsensusConfigDto) -> Self {
        Self { election_timeout_base_ms: dto.election_timeout_base_ms, heartbeat_interval_ms: dto.heartbeat_interval_ms }
    }
}

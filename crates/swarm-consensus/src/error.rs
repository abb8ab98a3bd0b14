use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("election timed out after {0}ms with no leader")]
    ElectionTimeout(u64),
    #[error("proposal must be submitted to the current leader")]
    NotLeader,
    #[error("insufficient quorum: {active} active of {total} registered agents")]
    InsufficientQuorum { active: usize, total: usize },
}

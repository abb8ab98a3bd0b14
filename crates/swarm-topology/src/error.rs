/// Topology mutation failures.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("agent '{0}' is already present in the topology")]
    DuplicateAgent(String),

    #[error("agent '{0}' is not present in the topology")]
    UnknownAgent(String),

    #[error("hierarchical topology requires a parent_id for non-root agent '{0}'")]
    MissingParent(String),

    #[error("parent '{parent}' of agent '{agent}' is not registered")]
    UnknownParent { agent: String, parent: String },

    #[error("star topology already has a hub; pass an explicit replacement to change it")]
    HubAlreadySet,

    #[error("unknown topology kind '{0}'")]
    UnknownKind(String),
}

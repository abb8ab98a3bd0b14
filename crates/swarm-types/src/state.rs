use crate::AgentId;

/// One entry in the coordinator-wide synchronized state map: a value plus
/// the bookkeeping needed to prove the version strictly increases on every
/// write to the same key.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncStateEntry {
    pub value: serde_json::Value,
    pub version: u64,
    pub last_writer: AgentId,
}

impl SyncStateEntry {
    pub fn first(value: serde_json::Value, writer: impl Into<AgentId>) -> Self {
        Self { value, version: 1, last_writer: writer.into() }
    }

    /// Produces the next version of this entry; the caller is responsible for
    /// storing it back under the lock that makes this read-modify-write atomic.
    pub fn next(&self, value: serde_json::Value, writer: impl Into<AgentId>) -> Self {
        Self { value, version: self.version + 1, last_writer: writer.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_strictly_increases() {
        let e1 = SyncStateEntry::first(serde_json::json!(1), "a1");
        let e2 = e1.next(serde_json::json!(2), "a2");
        let e3 = e2.next(serde_json::json!(3), "a1");
        assert_eq!([e1.version, e2.version, e3.version], [1, 2, 3]);
    }
}

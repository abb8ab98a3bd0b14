use crate::{Store, StorageError};
use chrono::{DateTime, Utc};

/// One row of `agent_events`: a timestamped lifecycle event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentEvent {
    pub event_type: String,
    pub agent_id: String,
    pub agent_type: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Optional filters for `get_events`. All `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub agent_id: Option<String>,
    pub event_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

pub(crate) fn query_events(store: &Store, filter: EventFilter, limit: usize) -> Result<Vec<AgentEvent>, StorageError> {
    let mut sql = String::from(
        "SELECT event_type, agent_id, agent_type, timestamp, metadata FROM agent_events WHERE 1=1",
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(agent_id) = &filter.agent_id {
        sql.push_str(" AND agent_id = ?");
        params.push(Box::new(agent_id.clone()));
    }
    if let Some(event_type) = &filter.event_type {
        sql.push_str(" AND event_type = ?");
        params.push(Box::new(event_type.clone()));
    }
    if let Some(since) = &filter.since {
        sql.push_str(" AND timestamp >= ?");
        params.push(Box::new(since.to_rfc3339()));
    }
    sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
    params.push(Box::new(limit as i64));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    store.query(&sql, &param_refs, |row| {
        let ts_str: String = row.get(3)?;
        let metadata_str: String = row.get(4)?;
        Ok(AgentEvent {
            event_type: row.get(0)?,
            agent_id: row.get(1)?,
            agent_type: row.get(2)?,
            timestamp: DateTime::parse_from_rfc3339(&ts_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
        })
    })
}

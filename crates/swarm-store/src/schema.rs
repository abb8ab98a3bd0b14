use rusqlite::Connection;

/// Ordered schema migrations, applied once each, tracked in `schema_info`.
/// Append new entries; never edit an already-shipped one (the table records
/// "what did this process run", so history matters).
const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        r#"
        CREATE TABLE IF NOT EXISTS agent_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            metadata TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agent_events_agent_id ON agent_events(agent_id);
        CREATE INDEX IF NOT EXISTS idx_agent_events_timestamp ON agent_events(timestamp);

        CREATE TABLE IF NOT EXISTS agent_registry (
            agent_id TEXT PRIMARY KEY,
            agent_type TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            duration_ms INTEGER,
            metadata TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            result TEXT NOT NULL,
            tokens INTEGER,
            files_changed INTEGER,
            timestamp TEXT NOT NULL,
            tags TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_task_metrics_agent_id ON task_metrics(agent_id);
        CREATE INDEX IF NOT EXISTS idx_task_metrics_timestamp ON task_metrics(timestamp);

        CREATE TABLE IF NOT EXISTS agent_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT NOT NULL,
            metric_type TEXT NOT NULL,
            value REAL NOT NULL,
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agent_metrics_agent_id ON agent_metrics(agent_id);

        CREATE TABLE IF NOT EXISTS swarm_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            swarm_id TEXT NOT NULL,
            metric_type TEXT NOT NULL,
            value REAL NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS semantic_knowledge (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            category TEXT NOT NULL,
            knowledge TEXT NOT NULL,
            confidence REAL NOT NULL,
            tags TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_used TEXT
        );

        CREATE TABLE IF NOT EXISTS code_patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id TEXT NOT NULL,
            pattern_name TEXT NOT NULL,
            pattern_data TEXT NOT NULL,
            category TEXT NOT NULL,
            confidence REAL NOT NULL,
            tags TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        "#,
    ),
];

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_info (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);",
    )?;
    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_info", [], |r| r.get(0))
        .unwrap_or(0);
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_info (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
        )?;
    }
    Ok(())
}

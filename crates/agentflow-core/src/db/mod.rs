//! SQLite database layer backing the agent loader, the run log and the rate limiter.
//!
//! The schema is versioned through `PRAGMA user_version`; opening a database
//! applies any pending entries of `MIGRATIONS`. Async callers go through
//! `with_conn_async`, which runs on the blocking pool.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::FlowError;

/// Ordered schema migrations. Entry `i` moves the schema to `user_version = i + 1`.
const MIGRATIONS: &[&str] = &[
    // 1: agent definitions and the run log
    "
    CREATE TABLE agents (
        id              TEXT PRIMARY KEY,
        name            TEXT NOT NULL,
        role_prompt     TEXT NOT NULL,
        model           TEXT NOT NULL,
        temperature     REAL NOT NULL DEFAULT 0.7,
        max_tokens      INTEGER NOT NULL DEFAULT 4096,
        tools           TEXT NOT NULL DEFAULT '[]',
        created_at      INTEGER NOT NULL,
        updated_at      INTEGER NOT NULL
    );

    CREATE TABLE workflow_runs (
        id              TEXT PRIMARY KEY,
        workflow_id     TEXT NOT NULL,
        user_id         TEXT NOT NULL,
        input           TEXT NOT NULL,
        output          TEXT,
        error           TEXT,
        status          TEXT NOT NULL DEFAULT 'pending',
        started_at      INTEGER,
        finished_at     INTEGER
    );

    CREATE TABLE agent_runs (
        id              TEXT PRIMARY KEY,
        workflow_run_id TEXT NOT NULL REFERENCES workflow_runs(id) ON DELETE CASCADE,
        agent_id        TEXT NOT NULL,
        step_order      INTEGER NOT NULL,
        input           TEXT NOT NULL,
        output          TEXT,
        error           TEXT,
        status          TEXT NOT NULL DEFAULT 'pending',
        started_at      INTEGER,
        finished_at     INTEGER,
        UNIQUE (workflow_run_id, step_order)
    );

    CREATE TABLE tool_invocations (
        id                  TEXT PRIMARY KEY,
        agent_run_id        TEXT NOT NULL REFERENCES agent_runs(id) ON DELETE CASCADE,
        tool                TEXT NOT NULL,
        params              TEXT NOT NULL DEFAULT '{}',
        status              TEXT NOT NULL,
        result              TEXT,
        error               TEXT,
        started_at          INTEGER NOT NULL,
        finished_at         INTEGER NOT NULL,
        execution_time_ms   INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX idx_workflow_runs_workflow ON workflow_runs(workflow_id);
    CREATE INDEX idx_agent_runs_workflow_run ON agent_runs(workflow_run_id);
    CREATE INDEX idx_tool_invocations_agent_run ON tool_invocations(agent_run_id);
    ",
    // 2: per-user rate-limit windows
    "
    CREATE TABLE rate_limits (
        user_id         TEXT NOT NULL,
        action          TEXT NOT NULL,
        window_start    INTEGER NOT NULL,
        count           INTEGER NOT NULL,
        PRIMARY KEY (user_id, action)
    );
    ",
];

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path and bring its schema up to date.
    pub fn open(db_path: &str) -> Result<Self, FlowError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| FlowError::Database(format!("Failed to open database: {}", e)))?;
        let db = Self::prepare(conn, "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        tracing::info!("[Database] Opened {} (schema v{})", db_path, db.schema_version()?);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, FlowError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FlowError::Database(format!("Failed to open in-memory db: {}", e)))?;
        Self::prepare(conn, "PRAGMA foreign_keys=ON;")
    }

    fn prepare(conn: Connection, pragmas: &str) -> Result<Self, FlowError> {
        conn.execute_batch(pragmas)
            .map_err(|e| FlowError::Database(format!("Failed to set pragmas: {}", e)))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, FlowError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FlowError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| FlowError::Database(e.to_string()))
    }

    /// Execute a closure on the blocking pool with access to the connection.
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, FlowError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| FlowError::Database(format!("Task join error: {}", e)))?
    }

    /// Current `PRAGMA user_version`.
    pub fn schema_version(&self) -> Result<usize, FlowError> {
        self.with_conn(|conn| conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0)))
            .map(|v| v as usize)
    }

    /// Apply every migration newer than the stored schema version, each in its own transaction.
    fn migrate(&self) -> Result<(), FlowError> {
        let current = self.schema_version()?;
        if current > MIGRATIONS.len() {
            return Err(FlowError::Database(format!(
                "Database schema v{} is newer than this build (v{})",
                current,
                MIGRATIONS.len()
            )));
        }

        for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
            let version = index + 1;
            self.with_conn(|conn| {
                let tx = conn.unchecked_transaction()?;
                tx.execute_batch(sql)?;
                tx.pragma_update(None, "user_version", version as i64)?;
                tx.commit()
            })
            .map_err(|e| FlowError::Database(format!("Migration v{} failed: {}", version, e)))?;
            tracing::debug!("[Database] Applied migration v{}", version);
        }
        Ok(())
    }
}

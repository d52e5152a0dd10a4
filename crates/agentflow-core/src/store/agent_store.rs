use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::FlowError;
use crate::models::AgentConfig;
use crate::workflow::AgentLoader;

#[derive(Clone)]
pub struct AgentStore {
    db: Database,
}

impl AgentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace an agent. `created_at` is kept on update.
    pub async fn save(&self, agent: &AgentConfig) -> Result<(), FlowError> {
        let a = agent.clone();
        let tools = serde_json::to_string(&a.tools)?;
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO agents (id, name, role_prompt, model, temperature, max_tokens, tools, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       role_prompt = excluded.role_prompt,
                       model = excluded.model,
                       temperature = excluded.temperature,
                       max_tokens = excluded.max_tokens,
                       tools = excluded.tools,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        a.id,
                        a.name,
                        a.role_prompt,
                        a.model,
                        a.temperature,
                        a.max_tokens,
                        tools,
                        a.created_at.timestamp_millis(),
                        now,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, agent_id: &str) -> Result<Option<AgentConfig>, FlowError> {
        let id = agent_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, role_prompt, model, temperature, max_tokens, tools, created_at, updated_at
                     FROM agents WHERE id = ?1",
                )?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_agent(row)))
                    .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<AgentConfig>, FlowError> {
        self.db
            .with_conn_async(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, role_prompt, model, temperature, max_tokens, tools, created_at, updated_at
                     FROM agents ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_agent(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete(&self, agent_id: &str) -> Result<bool, FlowError> {
        let id = agent_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute("DELETE FROM agents WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await
    }
}

#[async_trait]
impl AgentLoader for AgentStore {
    async fn load_agent(&self, agent_id: &str) -> Result<AgentConfig, FlowError> {
        self.get(agent_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("Agent '{}'", agent_id)))
    }
}

use rusqlite::Row;

fn row_to_agent(row: &Row<'_>) -> AgentConfig {
    let tools_str: String = row.get(6).unwrap_or_default();
    let tools: Vec<String> = serde_json::from_str(&tools_str).unwrap_or_default();
    let created_ms: i64 = row.get(7).unwrap_or(0);
    let updated_ms: i64 = row.get(8).unwrap_or(0);

    AgentConfig {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        role_prompt: row.get(2).unwrap_or_default(),
        model: row.get(3).unwrap_or_default(),
        temperature: row.get(4).unwrap_or(0.7),
        max_tokens: row.get(5).unwrap_or(4096),
        tools,
        created_at: chrono::DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        updated_at: chrono::DateTime::from_timestamp_millis(updated_ms).unwrap_or_else(Utc::now),
    }
}

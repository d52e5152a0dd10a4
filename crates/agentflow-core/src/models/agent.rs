use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

/// A configured agent persona: role prompt, model parameters and enabled tools.
///
/// Loaded once per step and never mutated while a turn is running.
///
/// ```yaml
/// id: researcher
/// name: Researcher
/// role_prompt: |
///   You collect facts and cite sources.
/// model: gpt-4o-mini
/// temperature: 0.2
/// max_tokens: 2048
/// tools: [current_time]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub role_prompt: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Enabled tool ids, in declaration order.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "Utc::now", skip_serializing)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", skip_serializing)]
    pub updated_at: DateTime<Utc>,
}

impl AgentConfig {
    pub fn new(
        id: impl Into<String>,
        role_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            name: id.clone(),
            id,
            role_prompt: role_prompt.into(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            tools: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn is_tool_enabled(&self, tool_id: &str) -> bool {
        self.tools.iter().any(|t| t == tool_id)
    }

    /// Parse one agent or a list of agents from a YAML document.
    pub fn list_from_yaml(yaml: &str) -> Result<Vec<Self>, String> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<AgentConfig>),
            One(Box<AgentConfig>),
        }

        let parsed: OneOrMany = serde_yaml::from_str(yaml)
            .map_err(|e| format!("Failed to parse agent YAML: {}", e))?;
        Ok(match parsed {
            OneOrMany::Many(list) => list,
            OneOrMany::One(agent) => vec![*agent],
        })
    }
}

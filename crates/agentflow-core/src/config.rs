//! Engine configuration loaded from environment variables.
//!
//! | Variable                          | Default                        |
//! |-----------------------------------|--------------------------------|
//! | `AGENTFLOW_ADAPTER`               | `openai`                       |
//! | `AGENTFLOW_BASE_URL`              | adapter-specific               |
//! | `AGENTFLOW_API_KEY`               | `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` |
//! | `AGENTFLOW_MAX_ITERATIONS`        | `10`                           |
//! | `AGENTFLOW_MAX_TOOL_RESULT_CHARS` | `16000`                        |
//! | `AGENTFLOW_REQUEST_TIMEOUT_SECS`  | `300`                          |
//! | `AGENTFLOW_RATE_LIMIT`            | `30`                           |
//! | `AGENTFLOW_RATE_WINDOW_SECS`      | `3600`                         |
//!
//! Values may reference other variables with `${VAR}` or `${VAR:-default}`.

use std::str::FromStr;
use std::time::Duration;

use crate::agent::TurnOptions;
use crate::error::FlowError;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_MAX_TOOL_RESULT_CHARS: usize = 16_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelAdapter {
    OpenAi,
    Anthropic,
}

impl ModelAdapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }

    fn api_key_fallback_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for ModelAdapter {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" | "opencode" | "openai-compatible" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(FlowError::Config(format!(
                "Unknown adapter type: '{}' (expected openai or anthropic)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub adapter: ModelAdapter,
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub max_iterations: u32,
    pub max_tool_result_chars: usize,
    /// Workflow runs allowed per user per window.
    pub rate_limit: u32,
    pub rate_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let adapter = ModelAdapter::OpenAi;
        Self {
            adapter,
            base_url: adapter.default_base_url().to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(300),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_result_chars: DEFAULT_MAX_TOOL_RESULT_CHARS,
            rate_limit: 30,
            rate_window: Duration::from_secs(3600),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, FlowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (env, map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FlowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| resolve_env_vars(&v, &lookup))
                .filter(|v| !v.trim().is_empty())
        };

        let adapter = match get("AGENTFLOW_ADAPTER") {
            Some(v) => v.parse::<ModelAdapter>()?,
            None => ModelAdapter::OpenAi,
        };

        let base_url = get("AGENTFLOW_BASE_URL")
            .unwrap_or_else(|| adapter.default_base_url().to_string());

        let api_key = get("AGENTFLOW_API_KEY")
            .or_else(|| get(adapter.api_key_fallback_var()))
            .unwrap_or_default();

        let defaults = Self::default();
        Ok(Self {
            adapter,
            base_url,
            api_key,
            request_timeout: Duration::from_secs(parse_number(
                "AGENTFLOW_REQUEST_TIMEOUT_SECS",
                get("AGENTFLOW_REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout.as_secs(),
            )?),
            max_iterations: parse_number(
                "AGENTFLOW_MAX_ITERATIONS",
                get("AGENTFLOW_MAX_ITERATIONS"),
                defaults.max_iterations,
            )?,
            max_tool_result_chars: parse_number(
                "AGENTFLOW_MAX_TOOL_RESULT_CHARS",
                get("AGENTFLOW_MAX_TOOL_RESULT_CHARS"),
                defaults.max_tool_result_chars,
            )?,
            rate_limit: parse_number("AGENTFLOW_RATE_LIMIT", get("AGENTFLOW_RATE_LIMIT"), defaults.rate_limit)?,
            rate_window: Duration::from_secs(parse_number(
                "AGENTFLOW_RATE_WINDOW_SECS",
                get("AGENTFLOW_RATE_WINDOW_SECS"),
                defaults.rate_window.as_secs(),
            )?),
        })
    }

    /// Fails when no API key was configured.
    pub fn require_api_key(&self) -> Result<(), FlowError> {
        if self.api_key.is_empty() {
            return Err(FlowError::Config(format!(
                "No API key found. Set AGENTFLOW_API_KEY or {}.",
                self.adapter.api_key_fallback_var()
            )));
        }
        Ok(())
    }

    pub fn turn_options(&self) -> TurnOptions {
        TurnOptions {
            max_iterations: self.max_iterations.max(1),
            max_tool_result_chars: self.max_tool_result_chars,
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, FlowError> {
    match value {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_| FlowError::Config(format!("{} must be a number, got '{}'", key, v))),
        None => Ok(default),
    }
}

/// Resolve `${VAR}` and `${VAR:-default}` references in a string through `lookup`.
/// Unknown references without a default are left as written.
pub fn resolve_env_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return input.to_string();
    }
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        // Support default value syntax: ${VAR:-default}
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            lookup(var_name).unwrap_or_else(|| default_val.to_string())
        } else {
            lookup(var_expr).unwrap_or_else(|| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}

//! Agent profiles: the system prompt, enabled tools and sampling settings the
//! conversation loop runs with.
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::tools::{GENERATE_JOB_DESCRIPTION, GENERATE_SEO_CONTENT};

pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub system_prompt: String,
    /// Names of the catalog tools this agent may call
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub config: AgentConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AgentProfile {
    pub fn new<I: Into<String>, P: Into<String>>(id: I, system_prompt: P) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            config: AgentConfig::default(),
            enabled: true,
        }
    }

    pub fn with_tools<S: Into<String>>(mut self, tools: impl IntoIterator<Item = S>) -> Self {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Resolves an agent id to the profile the loop should run with
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn lookup(&self, agent_id: &str) -> Option<AgentProfile>;

    /// Every enabled agent, ordered by id
    async fn list(&self) -> Vec<AgentProfile>;
}

#[derive(Debug, Deserialize)]
struct AgentsFile {
    agents: Vec<AgentProfile>,
}

/// An in-memory registry, usually loaded from a YAML file
#[derive(Debug, Clone, Default)]
pub struct StaticAgentRegistry {
    agents: HashMap<String, AgentProfile>,
}

impl StaticAgentRegistry {
    pub fn new(agents: Vec<AgentProfile>) -> Self {
        Self {
            agents: agents
                .into_iter()
                .map(|agent| (agent.id.clone(), agent))
                .collect(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: AgentsFile = serde_yaml::from_str(yaml).context("Invalid agents file")?;
        Ok(Self::new(file.agents))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agents file {}", path.display()))?;
        Self::from_yaml(&yaml)
    }

    /// The recruitment agents that ship with the server
    pub fn builtin() -> Self {
        Self::new(vec![
            AgentProfile {
                name: "Job Description Writer".to_string(),
                ..AgentProfile::new(
                    "job-description",
                    "You are an expert recruitment copywriter. Take the user's requirements and \
                     write a complete, professional job description in markdown with sections for \
                     the role, responsibilities, requirements and benefits.",
                )
                .with_tools([GENERATE_JOB_DESCRIPTION])
            },
            AgentProfile {
                name: "SEO Content Writer".to_string(),
                ..AgentProfile::new(
                    "seo-content",
                    "You are an SEO content strategist for the recruitment industry. Write \
                     keyword-rich, well-structured content with a meta description and a clear \
                     H1/H2/H3 heading hierarchy.",
                )
                .with_tools([GENERATE_SEO_CONTENT])
            },
        ])
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentRegistry for StaticAgentRegistry {
    async fn lookup(&self, agent_id: &str) -> Option<AgentProfile> {
        self.agents
            .get(agent_id)
            .filter(|agent| agent.enabled)
            .cloned()
    }

    async fn list(&self) -> Vec<AgentProfile> {
        let mut agents: Vec<AgentProfile> = self
            .agents
            .values()
            .filter(|agent| agent.enabled)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }
}

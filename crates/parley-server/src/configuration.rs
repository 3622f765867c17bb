use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use parley::agent::DEFAULT_MAX_ROUNDS;
use parley::providers::configs::{
    AnthropicProviderConfig, ProviderConfig, ANTHROPIC_HOST, ANTHROPIC_MODEL,
};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        #[serde(default)]
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
    },
}

impl ProviderSettings {
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
            }),
        }
    }
}

/// Where agent profiles come from; the built-in agents are used when no file is set
#[derive(Debug, Default, Deserialize)]
pub struct AgentsSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct SessionsSettings {
    #[serde(default = "default_sessions_dir")]
    pub dir: PathBuf,
}

impl Default for SessionsSettings {
    fn default() -> Self {
        Self {
            dir: default_sessions_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoopSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agents: AgentsSettings,
    #[serde(default)]
    pub sessions: SessionsSettings,
    #[serde(default, rename = "loop")]
    pub conversation: LoopSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.type", "anthropic")?
            .set_default("provider.host", default_anthropic_host())?
            .set_default("provider.model", default_model())?
            .set_default(
                "sessions.dir",
                default_sessions_dir().to_string_lossy().to_string(),
            )?
            .set_default("loop.max_rounds", default_max_rounds() as i64)?
            .add_source(
                Environment::with_prefix("PARLEY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                return Err(match missing_key(&err) {
                    Some(key) => ConfigError::MissingEnvVar {
                        env_var: to_env_var(&key),
                    },
                    None => ConfigError::Other(err),
                });
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ProviderSettings::Anthropic { api_key, .. } = &self.provider;
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }
        if self.conversation.max_rounds == 0 {
            return Err(ConfigError::Invalid {
                key: "loop.max_rounds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// The dotted key a deserialization error complains about, if it is a missing field
fn missing_key(err: &config::ConfigError) -> Option<String> {
    if let config::ConfigError::NotFound(key) = err {
        return Some(key.clone());
    }
    // "missing field `type`", optionally followed by " for key `provider`"
    let message = err.to_string();
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    match rest
        .strip_prefix(" for key `")
        .and_then(|parent| parent.split_once('`'))
    {
        Some((parent, _)) if !parent.is_empty() => Some(format!("{}.{}", parent, field)),
        _ => Some(field.to_string()),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    ANTHROPIC_MODEL.to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_sessions_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
        .join("sessions")
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

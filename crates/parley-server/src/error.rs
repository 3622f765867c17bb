use thiserror::Error;

const ENV_PREFIX: &str = "PARLEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a dotted config key, e.g.
/// `provider.api_key` -> `PARLEY_PROVIDER__API_KEY`
pub fn to_env_var(key: &str) -> String {
    let path = key
        .split('.')
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join("__");
    format!("{}_{}", ENV_PREFIX, path)
}

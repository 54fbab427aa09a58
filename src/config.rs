//! Server configuration.
//!
//! Loaded from a TOML file; a missing file silently yields defaults so the
//! server runs with zero setup. Every field has a default, so partial files
//! only override what they mention. `${VAR}` references are expanded from
//! the environment before parsing.

use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::matchmaking::PairingRules;
use crate::score::ScoreRules;
use crate::session::GameTimings;

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "rollduel.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

// -----------------------------------------------------------------------------
// Config (root)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub game: GameTimings,
    #[serde(default)]
    pub matchmaking: PairingRules,
    #[serde(default)]
    pub scoring: ScoreRules,
}

impl Config {
    /// Load from `path`, expanding `${VAR}` and `${VAR:-default}` references.
    /// A missing file is not an error; it just means defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(toml::from_str(&expanded)?)
    }
}

// -----------------------------------------------------------------------------
// ServerConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Bearer token for the admin shutdown endpoint. Unset disables it.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            admin_token: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Shell-compatible forms: `${VAR}` (required), `${VAR:-default}`, `${VAR:-}`
/// and `$$` as an escaped `$`. A lone `$` passes through untouched, so plain
/// TOML never needs escaping.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                result.push_str(&resolve_var_reference(&mut chars)?);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Resolve one `${...}` reference, with the leading `${` already consumed.
fn resolve_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut name = String::new();
    let mut default_value: Option<String> = None;
    let mut closed = false;

    while let Some(c) = chars.next() {
        match c {
            '}' => {
                closed = true;
                break;
            }
            ':' if default_value.is_none() && chars.peek() == Some(&'-') => {
                chars.next();
                default_value = Some(String::new());
            }
            _ => match &mut default_value {
                Some(default) => default.push(c),
                None => name.push(c),
            },
        }
    }
    if !closed {
        return Err(ConfigError::UnclosedVarReference);
    }

    match std::env::var(&name) {
        Ok(value) => Ok(value),
        Err(_) => default_value.ok_or(ConfigError::MissingEnvVar(name)),
    }
}

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{GraphrunError, Result};

/// Top-level graphrun configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Stop the server as soon as setup has finished (smoke tests).
    #[serde(default)]
    pub close_after_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            close_after_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size of the worker pool node bodies run on.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Advisory backpressure timeout for setup/handshake events.
    #[serde(default = "default_setup_event_timeout_ms")]
    pub setup_event_timeout_ms: u64,
    /// Prune nodes whose outputs are unused before scheduling.
    #[serde(default = "default_optimize")]
    pub optimize: bool,
    /// How long a killed run waits for the running body before abandoning it.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            setup_event_timeout_ms: default_setup_event_timeout_ms(),
            optimize: default_optimize(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl EngineConfig {
    pub fn setup_event_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_event_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Log every published run event at debug level.
    #[serde(default)]
    pub log_events: bool,
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }
fn default_workers() -> usize { 4 }
fn default_setup_event_timeout_ms() -> u64 { 1000 }
fn default_optimize() -> bool { true }
fn default_kill_grace_ms() -> u64 { 250 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| GraphrunError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| GraphrunError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.workers == 0 {
            return Err(GraphrunError::Config(
                "engine.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns; unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex is valid")
    });
    pattern
        .replace_all(input, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_GRAPHRUN_BIND", "0.0.0.0:9000");
        let result = expand_env_vars("bind = \"${TEST_GRAPHRUN_BIND}\"");
        assert_eq!(result, "bind = \"0.0.0.0:9000\"");
        std::env::remove_var("TEST_GRAPHRUN_BIND");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_GRAPHRUN_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_GRAPHRUN_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert!(!config.server.close_after_start);
        assert_eq!(config.engine.workers, 4);
        assert_eq!(config.engine.setup_event_timeout(), Duration::from_secs(1));
        assert!(config.engine.optimize);
        assert_eq!(config.engine.kill_grace(), Duration::from_millis(250));
        assert!(!config.events.log_events);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = AppConfig::parse("[engine]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, GraphrunError::Config(_)));
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::parse(
            r#"
[engine]
workers = 8
optimize = false
"#,
        )
        .unwrap();
        assert_eq!(config.engine.workers, 8);
        assert!(!config.engine.optimize);
        assert_eq!(config.engine.setup_event_timeout_ms, 1000);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }
}

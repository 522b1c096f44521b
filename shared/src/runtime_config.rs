//! The main YAML configuration document: logging setup plus the
//! engine's own `config:` section. Missing mandatory paths are a fatal
//! startup error, not a default-filled-in one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::NightWatchError;

fn default_webserver_port() -> u16 {
    8888
}

/// `config:` section of the main configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub tasks_location: PathBuf,
    pub providers_location: PathBuf,
    pub actions_location: PathBuf,
    #[serde(default)]
    pub webserver_enabled: bool,
    #[serde(default = "default_webserver_port")]
    pub webserver_port: u16,
    #[serde(default)]
    pub webserver_debug: bool,
}

/// Output format for the daily-rolling log file, matching what
/// `tracing_subscriber::fmt` can be switched between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Json
    }
}

/// Logging subsystem configuration: a level filter plus everything
/// `tracing-appender::rolling::daily` needs to name and place the log
/// file, matching the teacher's own `agent`/`server` logging setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_file_prefix() -> String {
    "night-watch".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            file_prefix: default_file_prefix(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level main configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub config: EngineConfig,
}

impl RuntimeConfig {
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NightWatchError::ConfigurationInvalid(format!(
                "failed to read configuration file {}: {e}",
                path.display()
            ))
        })?;
        let config: RuntimeConfig = serde_yaml::from_str(&content).map_err(|e| {
            NightWatchError::ConfigurationInvalid(format!("configuration is not valid YAML: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        let mut problems = Vec::new();
        if self.config.tasks_location.as_os_str().is_empty() {
            problems.push("config.tasks_location is required".to_string());
        }
        if self.config.providers_location.as_os_str().is_empty() {
            problems.push("config.providers_location is required".to_string());
        }
        if self.config.actions_location.as_os_str().is_empty() {
            problems.push("config.actions_location is required".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(NightWatchError::ConfigurationInvalid(problems.join("; ")).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_document() {
        let yaml = r#"
config:
  tasks_location: /etc/night-watch/tasks
  providers_location: /etc/night-watch/providers
  actions_location: /etc/night-watch/actions
"#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.config.webserver_port, 8888);
        assert!(!config.config.webserver_enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.directory, std::path::PathBuf::from("./logs"));
        assert_eq!(config.logging.file_prefix, "night-watch");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_tasks_location_is_invalid() {
        let yaml = r#"
config:
  tasks_location: ""
  providers_location: /etc/night-watch/providers
  actions_location: /etc/night-watch/actions
"#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn webserver_and_logging_overrides_are_honoured() {
        let yaml = r#"
logging:
  level: debug
  directory: /var/log/night-watch
  file_prefix: nw
  format: pretty
config:
  tasks_location: /tasks
  providers_location: /providers
  actions_location: /actions
  webserver_enabled: true
  webserver_port: 9090
  webserver_debug: true
"#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.directory,
            std::path::PathBuf::from("/var/log/night-watch")
        );
        assert_eq!(config.logging.file_prefix, "nw");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.config.webserver_enabled);
        assert_eq!(config.config.webserver_port, 9090);
        assert!(config.config.webserver_debug);
    }
}

//! Task definition config, deserialized from YAML task-definition
//! files. Every validation problem produces a distinct human-readable
//! message, collected rather than short-circuited where more than one
//! can coexist.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::Value;
use crate::duration::parse_duration;
use crate::NightWatchError;

/// One entry in a task's `providers` list: `{provider_name: {condition,
/// threshold, provider_options}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderEntry {
    pub condition: String,
    pub threshold: Value,
    #[serde(default)]
    pub provider_options: BTreeMap<String, Value>,
}

/// A full task definition as it appears in a task file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub period_success: String,
    #[serde(default)]
    pub period_retry: Option<String>,
    pub period_failed: String,
    #[serde(default)]
    pub retries: u32,
    /// Ordered sequence of `{provider_name: ProviderEntry}` maps. A `Vec`
    /// of single-entry maps preserves declared order, which a plain
    /// map keyed by provider name would not; each entry's own map uses
    /// `BTreeMap` so re-serialising a task keeps a stable key order too.
    pub providers: Vec<BTreeMap<String, ProviderEntry>>,
    #[serde(default)]
    pub actions_failed: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    pub actions_success: BTreeMap<String, BTreeMap<String, Value>>,
}

impl TaskConfig {
    /// Validates the config entry for a task named `name`: duration
    /// literals parse, `period_retry` is present whenever `retries > 0`,
    /// and every provider's condition operator is recognised.
    pub fn validate(&self, name: &str) -> crate::Result<()> {
        let mut problems = Vec::new();

        if let Err(e) = parse_duration(&self.period_success) {
            problems.push(format!("period_success: {e}"));
        }
        if let Err(e) = parse_duration(&self.period_failed) {
            problems.push(format!("period_failed: {e}"));
        }

        if self.retries > 0 {
            match &self.period_retry {
                None => problems.push(
                    "period_retry is required because retries > 0".to_string(),
                ),
                Some(literal) => {
                    if let Err(e) = parse_duration(literal) {
                        problems.push(format!("period_retry: {e}"));
                    }
                }
            }
        }

        if self.providers.is_empty() {
            problems.push("providers must be a non-empty sequence".to_string());
        }

        for provider_map in &self.providers {
            for (provider_name, entry) in provider_map {
                if crate::condition::Condition::parse(&entry.condition).is_none() {
                    problems.push(format!(
                        "provider \"{provider_name}\": condition \"{}\" is not a recognised operator",
                        entry.condition
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(NightWatchError::TaskConfigInvalid(format!(
                "task \"{name}\": {}",
                problems.join("; ")
            ))
            .into())
        }
    }
}

/// Validates a whole task file's worth of entries, rejecting duplicate
/// names within the file (cross-file duplicates are the TaskManager's
/// concern, since it sees every file at once).
pub fn validate_file(tasks: &BTreeMap<String, TaskConfig>) -> crate::Result<()> {
    for (name, config) in tasks {
        config.validate(name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_provider() -> BTreeMap<String, ProviderEntry> {
        let mut m = BTreeMap::new();
        m.insert(
            "tcp_connect".to_string(),
            ProviderEntry {
                condition: "=".to_string(),
                threshold: Value::Number(1.0),
                provider_options: BTreeMap::new(),
            },
        );
        m
    }

    fn minimal_task() -> TaskConfig {
        TaskConfig {
            period_success: "60s".to_string(),
            period_retry: None,
            period_failed: "300s".to_string(),
            retries: 0,
            providers: vec![minimal_provider()],
            actions_failed: BTreeMap::new(),
            actions_success: BTreeMap::new(),
        }
    }

    #[test]
    fn minimal_task_is_valid() {
        assert!(minimal_task().validate("t").is_ok());
    }

    #[test]
    fn retries_without_period_retry_is_invalid() {
        let mut task = minimal_task();
        task.retries = 2;
        assert!(task.validate("t").is_err());
    }

    #[test]
    fn retries_with_period_retry_is_valid() {
        let mut task = minimal_task();
        task.retries = 2;
        task.period_retry = Some("10s".to_string());
        assert!(task.validate("t").is_ok());
    }

    #[test]
    fn empty_providers_is_invalid() {
        let mut task = minimal_task();
        task.providers.clear();
        assert!(task.validate("t").is_err());
    }

    #[test]
    fn unknown_condition_operator_is_invalid() {
        let mut task = minimal_task();
        task.providers[0].get_mut("tcp_connect").unwrap().condition = "roughly".to_string();
        assert!(task.validate("t").is_err());
    }

    #[test]
    fn malformed_duration_is_invalid() {
        let mut task = minimal_task();
        task.period_success = "not-a-duration".to_string();
        assert!(task.validate("t").is_err());
    }
}

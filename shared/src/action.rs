//! Action contract and registry, symmetric to `provider`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::condition::{Condition, Value};
use crate::provider::validate_parameters;
use crate::NightWatchError;

/// A side-effect executor (notification) invoked on a task's state edge.
///
/// `process` receives three parallel arrays describing the providers
/// implicated in the transition — their conditions, thresholds, and
/// observed values — plus whether the edge is a recovery (`success =
/// true`) or a failure (`success = false`).
#[async_trait::async_trait]
pub trait Action: Send + Sync {
    fn mandatory_parameters(&self) -> &[&str] {
        &[]
    }

    fn optional_parameters(&self) -> &[&str] {
        &[]
    }

    async fn process(
        &self,
        success: bool,
        conditions: &[Condition],
        thresholds: &[Value],
        values: &[Option<Value>],
    ) -> crate::Result<()>;
}

pub type ActionFactory = fn(config: &BTreeMap<String, Value>) -> crate::Result<Arc<dyn Action>>;

/// Name-indexed cache of action factories and default configuration
/// documents, symmetric to `ProviderRegistry`.
pub struct ActionRegistry {
    actions_dir: std::path::PathBuf,
    factories: HashMap<&'static str, ActionFactory>,
    default_configs: RwLock<HashMap<String, Option<BTreeMap<String, Value>>>>,
}

impl ActionRegistry {
    pub fn new(actions_dir: impl Into<std::path::PathBuf>) -> Self {
        let mut factories: HashMap<&'static str, ActionFactory> = HashMap::new();
        factories.insert("log", crate::actions::log::build);
        factories.insert("webhook", crate::actions::webhook::build);
        Self {
            actions_dir: actions_dir.into(),
            factories,
            default_configs: RwLock::new(HashMap::new()),
        }
    }

    fn default_config(&self, name: &str) -> crate::Result<Option<BTreeMap<String, Value>>> {
        if let Some(cached) = self.default_configs.read().unwrap().get(name) {
            return Ok(cached.clone());
        }

        let path = self.actions_dir.join(format!("{name}.yml"));
        let loaded = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                NightWatchError::ActionConfigInvalid(format!(
                    "failed to read default config for action \"{name}\" at {}: {e}",
                    path.display()
                ))
            })?;
            let parsed: BTreeMap<String, Value> = serde_yaml::from_str(&content).map_err(|e| {
                NightWatchError::ActionConfigInvalid(format!(
                    "default config for action \"{name}\" is not valid YAML: {e}"
                ))
            })?;
            Some(parsed)
        } else {
            None
        };

        self.default_configs
            .write()
            .unwrap()
            .insert(name.to_string(), loaded.clone());
        Ok(loaded)
    }

    pub fn instantiate(
        &self,
        name: &str,
        task_options: &BTreeMap<String, Value>,
    ) -> crate::Result<Arc<dyn Action>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            NightWatchError::ActionConfigInvalid(format!("unknown action \"{name}\""))
        })?;

        let mut merged = self.default_config(name)?.unwrap_or_default();
        merged.extend(task_options.clone());

        factory(&merged)
    }

    /// Invalidates all cached default configs. Called by
    /// `TaskManager::reload`.
    pub fn clear(&self) {
        self.default_configs.write().unwrap().clear();
    }
}

/// Re-exported so built-in action implementations can reuse the same
/// validation helper providers use, without importing from `provider`
/// directly.
pub(crate) fn validate(
    action_name: &str,
    config: &BTreeMap<String, Value>,
    mandatory: &[&str],
    optional: &[&str],
) -> crate::Result<()> {
    validate_parameters(action_name, config, mandatory, optional)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_is_rejected() {
        let registry = ActionRegistry::new("/nonexistent/actions");
        let result = registry.instantiate("does_not_exist", &BTreeMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn clear_forces_reread() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ActionRegistry::new(dir.path());
        assert!(registry.default_config("log").unwrap().is_none());
        std::fs::write(dir.path().join("log.yml"), "level: warn\n").unwrap();
        assert!(registry.default_config("log").unwrap().is_none());
        registry.clear();
        assert!(registry.default_config("log").unwrap().is_some());
    }
}

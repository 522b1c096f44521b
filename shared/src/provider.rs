//! Provider contract and registry.
//!
//! Providers are registered at build time in a name-keyed factory
//! table rather than discovered dynamically, since a statically
//! compiled binary has no equivalent of runtime module import.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

pub use crate::condition::Value;
use crate::NightWatchError;

/// A data collector producing one comparable value per call.
///
/// Implementations declare the configuration keys they require
/// (`mandatory_parameters`) and recognise (`optional_parameters`); any
/// other key present in the merged configuration is accepted but logged
/// as unrecognised.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn mandatory_parameters(&self) -> &[&str] {
        &[]
    }

    fn optional_parameters(&self) -> &[&str] {
        &[]
    }

    /// Collects and returns the metric. Any error is interpreted by the
    /// owning `Task` as a per-provider violation for that tick; this
    /// contract intentionally returns `anyhow::Error` rather than
    /// `NightWatchError` since the failure cause is opaque to the engine.
    async fn process(&self) -> crate::Result<Value>;
}

/// A name-keyed constructor: given the merged configuration map, builds
/// a boxed `Provider` instance or fails with `ProviderConfigInvalid`.
pub type ProviderFactory =
    fn(config: &BTreeMap<String, Value>) -> crate::Result<Arc<dyn Provider>>;

/// Validates that all of a provider's declared mandatory parameters are
/// present in the merged configuration, warns (via `tracing`) about
/// optional parameters that are absent, and about provided parameters
/// the provider does not recognise at all. Shared by every built-in
/// provider's constructor so the validation texture is consistent
/// across all of them.
pub fn validate_parameters(
    provider_name: &str,
    config: &BTreeMap<String, Value>,
    mandatory: &[&str],
    optional: &[&str],
) -> crate::Result<()> {
    for param in mandatory {
        if !config.contains_key(*param) {
            return Err(NightWatchError::ProviderConfigInvalid(format!(
                "provider \"{provider_name}\": mandatory parameter \"{param}\" is not provided"
            ))
            .into());
        }
    }
    for param in optional {
        if !config.contains_key(*param) {
            tracing::info!(provider = provider_name, parameter = param, "optional parameter not provided");
        }
    }
    for key in config.keys() {
        if !mandatory.contains(&key.as_str()) && !optional.contains(&key.as_str()) {
            tracing::info!(provider = provider_name, parameter = %key, "parameter is not managed by this provider");
        }
    }
    Ok(())
}

/// Name-indexed cache of provider factories and their default
/// configuration documents, loaded from `<providers_dir>/<name>.yml`.
///
/// Default configs are read once per name and cached; `clear()`
/// invalidates the cache (used by `TaskManager::reload`).
pub struct ProviderRegistry {
    providers_dir: std::path::PathBuf,
    factories: HashMap<&'static str, ProviderFactory>,
    default_configs: RwLock<HashMap<String, Option<BTreeMap<String, Value>>>>,
}

impl ProviderRegistry {
    pub fn new(providers_dir: impl Into<std::path::PathBuf>) -> Self {
        let mut factories: HashMap<&'static str, ProviderFactory> = HashMap::new();
        factories.insert("tcp_connect", crate::providers::tcp_connect::build);
        factories.insert("http_get", crate::providers::http_get::build);
        Self {
            providers_dir: providers_dir.into(),
            factories,
            default_configs: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up the default configuration document for `name`, reading
    /// and caching it on first use. `None` means no default-config file
    /// exists for this provider, which is a perfectly normal case.
    fn default_config(&self, name: &str) -> crate::Result<Option<BTreeMap<String, Value>>> {
        if let Some(cached) = self.default_configs.read().unwrap().get(name) {
            return Ok(cached.clone());
        }

        let path = self.providers_dir.join(format!("{name}.yml"));
        let loaded = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                NightWatchError::ProviderConfigInvalid(format!(
                    "failed to read default config for provider \"{name}\" at {}: {e}",
                    path.display()
                ))
            })?;
            let parsed: BTreeMap<String, Value> = serde_yaml::from_str(&content).map_err(|e| {
                NightWatchError::ProviderConfigInvalid(format!(
                    "default config for provider \"{name}\" is not valid YAML: {e}"
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

    /// Instantiates a provider by name: merges its cached default config
    /// (if any) with the task-supplied `provider_options` (task keys
    /// override defaults), then builds it via the registered factory.
    pub fn instantiate(
        &self,
        name: &str,
        provider_options: &BTreeMap<String, Value>,
    ) -> crate::Result<Arc<dyn Provider>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            NightWatchError::ProviderConfigInvalid(format!("unknown provider \"{name}\""))
        })?;

        let mut merged = self.default_config(name)?.unwrap_or_default();
        merged.extend(provider_options.clone());

        factory(&merged)
    }

    /// Invalidates all cached default configs. Called by
    /// `TaskManager::reload` so the next tick re-reads them from disk.
    pub fn clear(&self) {
        self.default_configs.write().unwrap().clear();
    }
}

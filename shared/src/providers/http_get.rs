//! `http_get` — issues a GET request and returns the numeric HTTP status
//! code. Mandatory `url`, optional `timeout_ms`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::condition::Value;
use crate::provider::{validate_parameters, Provider};
use crate::NightWatchError;

const MANDATORY: &[&str] = &["url"];
const OPTIONAL: &[&str] = &["timeout_ms"];

pub struct HttpGetProvider {
    url: String,
    timeout: Duration,
}

#[async_trait::async_trait]
impl Provider for HttpGetProvider {
    fn mandatory_parameters(&self) -> &[&str] {
        MANDATORY
    }

    fn optional_parameters(&self) -> &[&str] {
        OPTIONAL
    }

    async fn process(&self) -> crate::Result<Value> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let response = client.get(&self.url).send().await?;
        Ok(Value::Number(response.status().as_u16() as f64))
    }
}

pub fn build(config: &BTreeMap<String, Value>) -> crate::Result<Arc<dyn Provider>> {
    validate_parameters("http_get", config, MANDATORY, OPTIONAL)?;

    let url = match config.get("url") {
        Some(Value::Text(s)) => s.clone(),
        _ => {
            return Err(
                NightWatchError::ProviderConfigInvalid("http_get: \"url\" must be a string".to_string())
                    .into(),
            )
        }
    };
    url::Url::parse(&url).map_err(|e| {
        NightWatchError::ProviderConfigInvalid(format!("http_get: invalid url \"{url}\": {e}"))
    })?;

    let timeout_ms = match config.get("timeout_ms") {
        Some(Value::Number(n)) => *n as u64,
        _ => 5000,
    };

    Ok(Arc::new(HttpGetProvider {
        url,
        timeout: Duration::from_millis(timeout_ms),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_mandatory_parameter_is_rejected() {
        let config = BTreeMap::new();
        assert!(build(&config).is_err());
    }

    #[test]
    fn invalid_url_is_rejected() {
        let mut config = BTreeMap::new();
        config.insert("url".to_string(), Value::Text("not a url".to_string()));
        assert!(build(&config).is_err());
    }

    #[test]
    fn valid_config_builds() {
        let mut config = BTreeMap::new();
        config.insert(
            "url".to_string(),
            Value::Text("https://example.invalid/health".to_string()),
        );
        assert!(build(&config).is_ok());
    }
}

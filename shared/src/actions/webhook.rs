//! `webhook` — POSTs a JSON payload describing the transition to a
//! configured URL.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::action::{validate, Action};
use crate::condition::{Condition, Value};
use crate::NightWatchError;

const MANDATORY: &[&str] = &["url"];
const OPTIONAL: &[&str] = &["timeout_ms"];

pub struct WebhookAction {
    url: String,
    timeout: Duration,
}

#[async_trait::async_trait]
impl Action for WebhookAction {
    fn mandatory_parameters(&self) -> &[&str] {
        MANDATORY
    }

    fn optional_parameters(&self) -> &[&str] {
        OPTIONAL
    }

    async fn process(
        &self,
        success: bool,
        conditions: &[Condition],
        thresholds: &[Value],
        values: &[Option<Value>],
    ) -> crate::Result<()> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let payload = serde_json::json!({
            "success": success,
            "conditions": conditions.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>(),
            "thresholds": thresholds,
            "values": values,
        });
        let response = client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook: endpoint returned status {}", response.status());
        }
        Ok(())
    }
}

pub fn build(config: &BTreeMap<String, Value>) -> crate::Result<Arc<dyn Action>> {
    validate("webhook", config, MANDATORY, OPTIONAL)?;

    let url = match config.get("url") {
        Some(Value::Text(s)) => s.clone(),
        _ => {
            return Err(NightWatchError::ActionConfigInvalid(
                "webhook: \"url\" must be a string".to_string(),
            )
            .into())
        }
    };
    url::Url::parse(&url).map_err(|e| {
        NightWatchError::ActionConfigInvalid(format!("webhook: invalid url \"{url}\": {e}"))
    })?;

    let timeout_ms = match config.get("timeout_ms") {
        Some(Value::Number(n)) => *n as u64,
        _ => 5000,
    };

    Ok(Arc::new(WebhookAction {
        url,
        timeout: Duration::from_millis(timeout_ms),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_mandatory_parameter_is_rejected() {
        assert!(build(&BTreeMap::new()).is_err());
    }

    #[test]
    fn invalid_url_is_rejected() {
        let mut config = BTreeMap::new();
        config.insert("url".to_string(), Value::Text("not a url".to_string()));
        assert!(build(&config).is_err());
    }
}

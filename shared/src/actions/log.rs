//! `log` — the simplest possible notifier: writes a structured
//! `tracing` record describing the transition. Default action used in
//! examples and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::{validate, Action};
use crate::condition::{Condition, Value};

const OPTIONAL: &[&str] = &["message"];

pub struct LogAction {
    message: Option<String>,
}

#[async_trait::async_trait]
impl Action for LogAction {
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
        let prefix = self.message.as_deref().unwrap_or("task transition");
        if success {
            tracing::info!(?conditions, ?thresholds, ?values, "{prefix}: back to normal");
        } else {
            tracing::warn!(?conditions, ?thresholds, ?values, "{prefix}: task failed");
        }
        Ok(())
    }
}

pub fn build(config: &BTreeMap<String, Value>) -> crate::Result<Arc<dyn Action>> {
    validate("log", config, &[], OPTIONAL)?;
    let message = match config.get("message") {
        Some(Value::Text(s)) => Some(s.clone()),
        _ => None,
    };
    Ok(Arc::new(LogAction { message }))
}

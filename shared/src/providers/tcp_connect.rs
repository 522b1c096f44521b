//! `tcp_connect` — connects to `host:port` within a timeout. Returns `1`
//! on success; raises on failure or timeout, which the owning `Task`
//! records as a per-provider violation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::condition::Value;
use crate::provider::{validate_parameters, Provider};
use crate::NightWatchError;

const MANDATORY: &[&str] = &["host", "port"];
const OPTIONAL: &[&str] = &["timeout_ms"];

pub struct TcpConnectProvider {
    host: String,
    port: u16,
    timeout: Duration,
}

#[async_trait::async_trait]
impl Provider for TcpConnectProvider {
    fn mandatory_parameters(&self) -> &[&str] {
        MANDATORY
    }

    fn optional_parameters(&self) -> &[&str] {
        OPTIONAL
    }

    async fn process(&self) -> crate::Result<Value> {
        let addr = format!("{}:{}", self.host, self.port);
        tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| anyhow::anyhow!("tcp_connect: timed out connecting to {addr}"))?
            .map_err(|e| anyhow::anyhow!("tcp_connect: failed to connect to {addr}: {e}"))?;
        Ok(Value::Number(1.0))
    }
}

pub fn build(config: &BTreeMap<String, Value>) -> crate::Result<Arc<dyn Provider>> {
    validate_parameters("tcp_connect", config, MANDATORY, OPTIONAL)?;

    let host = match config.get("host") {
        Some(Value::Text(s)) => s.clone(),
        _ => {
            return Err(NightWatchError::ProviderConfigInvalid(
                "tcp_connect: \"host\" must be a string".to_string(),
            )
            .into())
        }
    };
    let port = match config.get("port") {
        Some(Value::Number(n)) => *n as u16,
        _ => {
            return Err(NightWatchError::ProviderConfigInvalid(
                "tcp_connect: \"port\" must be a number".to_string(),
            )
            .into())
        }
    };
    let timeout_ms = match config.get("timeout_ms") {
        Some(Value::Number(n)) => *n as u64,
        _ => 3000,
    };

    Ok(Arc::new(TcpConnectProvider {
        host,
        port,
        timeout: Duration::from_millis(timeout_ms),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connecting_to_a_closed_port_fails() {
        let mut config = BTreeMap::new();
        config.insert("host".to_string(), Value::Text("127.0.0.1".to_string()));
        // Port 1 is reserved and essentially never has a listener in test environments.
        config.insert("port".to_string(), Value::Number(1.0));
        config.insert("timeout_ms".to_string(), Value::Number(100.0));
        let provider = build(&config).unwrap();
        assert!(provider.process().await.is_err());
    }

    #[test]
    fn missing_mandatory_parameter_is_rejected() {
        let config = BTreeMap::new();
        assert!(build(&config).is_err());
    }
}

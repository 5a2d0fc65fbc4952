//! External collaborators
//!
//! Secret storage and media transport live outside the engine. Nodes and
//! the data plane reach them through these traits; in-process
//! implementations are provided for hosts and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{PadflowError, Result};

/// Public description of a stored secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Resolves secret ids stored in `Secret` pads into their values
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn list_secrets(&self) -> Result<Vec<SecretInfo>>;

    async fn resolve_secret(&self, id: &str) -> Result<String>;
}

/// Fixed in-memory secret table
#[derive(Default)]
pub struct StaticSecretProvider {
    secrets: BTreeMap<String, (SecretInfo, String)>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let info = SecretInfo {
            id: id.clone(),
            name: name.into(),
            description: None,
        };
        self.secrets.insert(id, (info, value.into()));
        self
    }

    /// Collect every environment variable starting with `prefix`.
    ///
    /// `PADFLOW_SECRET_OPENAI_KEY` becomes secret id `openai_key`.
    pub fn from_env(prefix: &str) -> Self {
        std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_lowercase(), value))
            })
            .fold(Self::new(), |provider, (id, value)| {
                provider.with_secret(id.clone(), id, value)
            })
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn list_secrets(&self) -> Result<Vec<SecretInfo>> {
        Ok(self.secrets.values().map(|(info, _)| info.clone()).collect())
    }

    async fn resolve_secret(&self, id: &str) -> Result<String> {
        self.secrets
            .get(id)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| PadflowError::Secret(format!("unknown secret '{}'", id)))
    }
}

/// A topic-routed message on the media transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    pub topic: String,
    /// Identity of the sending participant
    pub sender: String,
    /// Receiving participant; `None` broadcasts to every subscriber
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub payload: serde_json::Value,
}

/// Message side of the media transport
///
/// Track publishing is handled by media adapters and is not part of this
/// interface.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Identity of the local participant
    fn identity(&self) -> &str;

    async fn send_message(&self, message: TransportMessage) -> Result<()>;

    /// Receive every message published on `topic` from now on
    fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<TransportMessage>;
}

/// In-process transport that loops messages back to local subscribers
pub struct LocalTransport {
    identity: String,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<TransportMessage>)>>,
}

impl LocalTransport {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaTransport for LocalTransport {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn send_message(&self, message: TransportMessage) -> Result<()> {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        for (topic, tx) in subscribers.iter() {
            if *topic == message.topic {
                // A receiver closing between retain and send is harmless
                let _ = tx.send(message.clone());
            }
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<TransportMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push((topic.to_string(), tx));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_static_secrets() {
        let provider = StaticSecretProvider::new().with_secret("openai", "OpenAI key", "sk-123");

        let listed = assert_ok!(provider.list_secrets().await);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "OpenAI key");

        assert_eq!(assert_ok!(provider.resolve_secret("openai").await), "sk-123");
        assert_err!(provider.resolve_secret("missing").await);
    }

    #[tokio::test]
    async fn test_local_transport_routes_by_topic() {
        let transport = LocalTransport::new("host");
        let mut api = transport.subscribe("runtime_api");
        let mut other = transport.subscribe("chat");

        assert_ok!(
            transport
                .send_message(TransportMessage {
                    topic: "runtime_api".to_string(),
                    sender: "client".to_string(),
                    destination: None,
                    payload: json!({"hello": true}),
                })
                .await
        );

        let received = api.recv().await.unwrap();
        assert_eq!(received.sender, "client");
        assert!(other.try_recv().is_err());
    }
}

//! Services handed to running nodes.
//!
//! A graph runtime carries one [`ServiceExtensions`] shared by every node.
//! The two services the engine itself knows about are the secret provider
//! (for pads holding a secret id) and the media transport the data plane
//! is served on; both have typed accessors. Hosts may add their own
//! objects under other keys and nodes fetch them with [`ServiceExtensions::get`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::services::{MediaTransport, SecretProvider};

/// Keys of the services the engine looks up.
pub mod service_keys {
    /// `Arc<dyn SecretProvider>`
    pub const SECRETS: &str = "secrets";
    /// `Arc<dyn MediaTransport>`, set by `Graph::run`
    pub const TRANSPORT: &str = "transport";
}

#[derive(Default)]
pub struct ServiceExtensions {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ServiceExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`. A later call with the same key wins.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.entries.insert(key.to_string(), Box::new(value));
    }

    /// The entry under `key`, if one was stored with exactly type `T`
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref()
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn with_secrets(mut self, provider: Arc<dyn SecretProvider>) -> Self {
        self.set(service_keys::SECRETS, provider);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn MediaTransport>) -> Self {
        self.set(service_keys::TRANSPORT, transport);
        self
    }

    pub fn secrets(&self) -> Option<&Arc<dyn SecretProvider>> {
        self.get(service_keys::SECRETS)
    }

    pub fn transport(&self) -> Option<&Arc<dyn MediaTransport>> {
        self.get(service_keys::TRANSPORT)
    }
}

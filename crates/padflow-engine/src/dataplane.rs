//! Runtime data plane served over the media transport
//!
//! Requests arrive on one topic. Every request is acknowledged right away
//! and answered with a `complete` response once its work is done; both go
//! back to the requesting participant only.
//!
//! A `push_value` creates a root [`RequestContext`] tagged with the
//! `data_plane` originator, so `complete` means every item derived from
//! the pushed value has been fully processed (or the context timed out).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::context::{Completion, RequestContext};
use crate::pad::PadRef;
use crate::runtime::RuntimeHandle;
use crate::services::{MediaTransport, TransportMessage};

/// Originator tag of contexts created by the data plane
pub const DATA_PLANE_ORIGINATOR: &str = "data_plane";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataPlaneRequest {
    PushValue {
        request_id: String,
        node_id: String,
        source_pad_id: String,
        value: Value,
    },
    GetValue {
        request_id: String,
        node_id: String,
        property_pad_id: String,
    },
}

impl DataPlaneRequest {
    pub fn request_id(&self) -> &str {
        match self {
            Self::PushValue { request_id, .. } | Self::GetValue { request_id, .. } => request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataPlaneResponse {
    Ack {
        request_id: String,
    },
    Complete {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default)]
        timed_out: bool,
    },
}

impl DataPlaneResponse {
    fn done(request_id: String, value: Option<Value>) -> Self {
        Self::Complete {
            request_id,
            value,
            error: None,
            timed_out: false,
        }
    }

    fn failed(request_id: String, error: impl ToString) -> Self {
        Self::Complete {
            request_id,
            value: None,
            error: Some(error.to_string()),
            timed_out: false,
        }
    }
}

/// Serves data-plane requests for one running graph
pub struct DataPlaneServer {
    handle: RuntimeHandle,
    transport: Arc<dyn MediaTransport>,
    topic: String,
    timeout: Duration,
}

impl DataPlaneServer {
    pub fn new(handle: RuntimeHandle, transport: Arc<dyn MediaTransport>, config: &EngineConfig) -> Self {
        Self {
            handle,
            transport,
            topic: config.data_plane_topic.clone(),
            timeout: config.data_plane_timeout(),
        }
    }

    /// Subscribe to the request topic and serve it on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        let requests = self.transport.subscribe(&self.topic);
        log::info!(
            "Serving data plane for run {} on topic '{}'",
            self.handle.run_id(),
            self.topic
        );
        tokio::spawn(Arc::new(self).serve(requests))
    }

    async fn serve(self: Arc<Self>, mut requests: mpsc::UnboundedReceiver<TransportMessage>) {
        while let Some(message) = requests.recv().await {
            let identity = self.transport.identity();
            if message.sender == identity {
                continue;
            }
            if message.destination.as_deref().is_some_and(|d| d != identity) {
                continue;
            }

            let request: DataPlaneRequest = match serde_json::from_value(message.payload) {
                Ok(request) => request,
                Err(e) => {
                    log::warn!("Ignoring malformed data-plane request from {}: {}", message.sender, e);
                    continue;
                }
            };

            let server = self.clone();
            tokio::spawn(async move { server.handle_request(message.sender, request).await });
        }
        log::debug!("Data-plane subscription on '{}' closed", self.topic);
    }

    async fn handle_request(&self, sender: String, request: DataPlaneRequest) {
        log::debug!("Data-plane request {:?} from {}", request, sender);
        self.reply(
            &sender,
            DataPlaneResponse::Ack {
                request_id: request.request_id().to_string(),
            },
        )
        .await;

        let response = match request {
            DataPlaneRequest::PushValue {
                request_id,
                node_id,
                source_pad_id,
                value,
            } => {
                self.push(request_id, &sender, PadRef::new(node_id, source_pad_id), value)
                    .await
            }
            DataPlaneRequest::GetValue {
                request_id,
                node_id,
                property_pad_id,
            } => match self.handle.get_value(&PadRef::new(node_id, property_pad_id)) {
                Ok(value) => DataPlaneResponse::done(request_id, value),
                Err(e) => DataPlaneResponse::failed(request_id, e),
            },
        };
        self.reply(&sender, response).await;
    }

    async fn push(&self, request_id: String, sender: &str, pad: PadRef, value: Value) -> DataPlaneResponse {
        let mut metadata = HashMap::new();
        metadata.insert("participant".to_string(), sender.to_string());
        let ctx = RequestContext::builder()
            .originator(DATA_PLANE_ORIGINATOR)
            .publisher_metadata(metadata)
            .timeout(self.timeout)
            .build();

        if let Err(e) = self.handle.push_value(&pad, value, &ctx) {
            ctx.cancel();
            log::info!("Rejected data-plane push to {}: {}", pad, e);
            return DataPlaneResponse::failed(request_id, e);
        }

        ctx.complete();
        let timed_out = ctx.done().await == Completion::TimedOut;
        if timed_out {
            log::warn!("Data-plane push {} to {} timed out", request_id, pad);
        }
        DataPlaneResponse::Complete {
            request_id,
            value: None,
            error: None,
            timed_out,
        }
    }

    async fn reply(&self, destination: &str, response: DataPlaneResponse) {
        let payload = match serde_json::to_value(&response) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Failed to encode data-plane response: {}", e);
                return;
            }
        };
        let message = TransportMessage {
            topic: self.topic.clone(),
            sender: self.transport.identity().to_string(),
            destination: Some(destination.to_string()),
            payload,
        };
        if let Err(e) = self.transport.send_message(message).await {
            log::warn!("Failed to send data-plane response to {}: {}", destination, e);
        }
    }
}

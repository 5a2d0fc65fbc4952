//! Runtime pad handles handed to node run tasks
//!
//! Every sink pad owns a bounded mpsc queue; a source pad holds one sender
//! per connected sink. Delivery never blocks the producer: a full queue
//! drops the item for that sink only and completes its forked context.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::context::RequestContext;
use crate::error::{PadflowError, Result};
use crate::events::{EventSink, GraphEvent};
use crate::extensions::ServiceExtensions;
use crate::pad::{PadKind, PadRef};
use crate::services::SecretProvider;

/// One value travelling between pads, with the context that tracks it
#[derive(Debug, Clone)]
pub struct PadItem {
    pub value: Value,
    pub ctx: RequestContext,
}

/// Shared retained value of a property pad
#[derive(Debug, Clone, Default)]
pub struct PropertyCell {
    value: Arc<Mutex<Option<Value>>>,
}

impl PropertyCell {
    pub fn new(initial: Option<Value>) -> Self {
        Self {
            value: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn get(&self) -> Option<Value> {
        self.value.lock().clone()
    }

    pub fn set(&self, value: Value) {
        *self.value.lock() = Some(value);
    }
}

pub(crate) struct SinkEndpoint {
    pub(crate) target: PadRef,
    pub(crate) tx: mpsc::Sender<PadItem>,
    pub(crate) retained: Option<PropertyCell>,
}

struct SourceInner {
    pad: PadRef,
    kind: PadKind,
    retained: Option<PropertyCell>,
    endpoints: Vec<SinkEndpoint>,
    events: Arc<dyn EventSink>,
}

/// Producing side of a pad; cheap to clone
#[derive(Clone)]
pub struct SourcePad {
    inner: Arc<SourceInner>,
}

impl SourcePad {
    pub(crate) fn new(
        pad: PadRef,
        kind: PadKind,
        retained: Option<PropertyCell>,
        endpoints: Vec<SinkEndpoint>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                pad,
                kind,
                retained,
                endpoints,
                events,
            }),
        }
    }

    pub fn pad(&self) -> &PadRef {
        &self.inner.pad
    }

    pub fn kind(&self) -> PadKind {
        self.inner.kind
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.endpoints.is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.endpoints.len()
    }

    /// Deliver `value` to every connected sink.
    ///
    /// `ctx` is forked once per sink and each delivery carries its own fork.
    /// The caller still owns `ctx` and completes it as usual. Returns the
    /// number of sinks that accepted the item.
    pub fn push_item(&self, value: Value, ctx: &RequestContext) -> usize {
        if let Some(cell) = &self.inner.retained {
            cell.set(value.clone());
        }

        let mut delivered = 0;
        for endpoint in &self.inner.endpoints {
            if let Some(cell) = &endpoint.retained {
                cell.set(value.clone());
            }

            let item = PadItem {
                value: value.clone(),
                ctx: ctx.fork(),
            };
            match endpoint.tx.try_send(item) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(item)) => {
                    item.ctx.complete();
                    self.report_drop(endpoint);
                }
                Err(TrySendError::Closed(item)) => {
                    item.ctx.complete();
                    log::debug!(
                        "Sink {} is closed; discarding item from {}",
                        endpoint.target,
                        self.inner.pad
                    );
                }
            }
        }
        delivered
    }

    fn report_drop(&self, endpoint: &SinkEndpoint) {
        if endpoint.retained.is_some() {
            log::debug!(
                "Queue of property sink {} full; retained value updated, item dropped",
                endpoint.target
            );
        } else {
            log::warn!(
                "Queue of sink {} full; dropping item from {}",
                endpoint.target,
                self.inner.pad
            );
        }

        let event = GraphEvent::ItemDropped {
            source: self.inner.pad.to_string(),
            sink: endpoint.target.to_string(),
            reason: "queue full".to_string(),
        };
        if let Err(e) = self.inner.events.send(event) {
            log::trace!("Failed to report dropped item: {}", e);
        }
    }

    /// Retained value of a property source
    pub fn get_value(&self) -> Result<Option<Value>> {
        self.inner
            .retained
            .as_ref()
            .map(PropertyCell::get)
            .ok_or_else(|| PadflowError::NotAPropertyPad(self.inner.pad.clone()))
    }

    /// Replace the retained value without emitting anything
    pub fn set_value(&self, value: Value) -> Result<()> {
        match &self.inner.retained {
            Some(cell) => {
                cell.set(value);
                Ok(())
            }
            None => Err(PadflowError::NotAPropertyPad(self.inner.pad.clone())),
        }
    }
}

/// Consuming side of a pad
///
/// Items arrive in FIFO order. `next` yields `None` once every upstream
/// sender is gone, which for an unconnected sink is immediately.
pub struct SinkPad {
    pad: PadRef,
    rx: mpsc::Receiver<PadItem>,
    retained: Option<PropertyCell>,
}

impl SinkPad {
    pub(crate) fn new(pad: PadRef, rx: mpsc::Receiver<PadItem>, retained: Option<PropertyCell>) -> Self {
        Self { pad, rx, retained }
    }

    pub fn pad(&self) -> &PadRef {
        &self.pad
    }

    /// Wait for the next item, or `None` at end of stream
    pub async fn next(&mut self) -> Option<PadItem> {
        self.rx.recv().await
    }

    pub fn get_value(&self) -> Result<Option<Value>> {
        self.retained
            .as_ref()
            .map(PropertyCell::get)
            .ok_or_else(|| PadflowError::NotAPropertyPad(self.pad.clone()))
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        match &self.retained {
            Some(cell) => {
                cell.set(value);
                Ok(())
            }
            None => Err(PadflowError::NotAPropertyPad(self.pad.clone())),
        }
    }

    /// Acknowledge every item until end of stream.
    ///
    /// For property sinks whose node only reads the retained value.
    pub async fn drain(mut self) {
        while let Some(item) = self.next().await {
            item.ctx.complete();
        }
    }
}

impl Drop for SinkPad {
    fn drop(&mut self) {
        // Items nobody will read must not keep their contexts open
        self.rx.close();
        let mut discarded = 0;
        while let Ok(item) = self.rx.try_recv() {
            item.ctx.complete();
            discarded += 1;
        }
        if discarded > 0 {
            log::debug!("Sink {} closed with {} unread item(s)", self.pad, discarded);
        }
    }
}

/// Everything a node's run task may touch
pub struct NodeIo {
    node_id: String,
    sources: HashMap<String, SourcePad>,
    sinks: HashMap<String, SinkPad>,
    properties: HashMap<String, PropertyCell>,
    services: Arc<ServiceExtensions>,
}

impl NodeIo {
    pub(crate) fn new(node_id: String, services: Arc<ServiceExtensions>) -> Self {
        Self {
            node_id,
            sources: HashMap::new(),
            sinks: HashMap::new(),
            properties: HashMap::new(),
            services,
        }
    }

    pub(crate) fn add_source(&mut self, id: String, pad: SourcePad) {
        self.sources.insert(id, pad);
    }

    pub(crate) fn add_sink(&mut self, id: String, pad: SinkPad) {
        self.sinks.insert(id, pad);
    }

    pub(crate) fn add_property(&mut self, id: String, cell: PropertyCell) {
        self.properties.insert(id, cell);
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn source(&self, id: &str) -> Result<SourcePad> {
        self.sources
            .get(id)
            .cloned()
            .ok_or_else(|| PadflowError::PadNotFound(PadRef::new(&self.node_id, id)))
    }

    /// Move a sink out so it can be read from its own task
    pub fn take_sink(&mut self, id: &str) -> Result<SinkPad> {
        self.sinks
            .remove(id)
            .ok_or_else(|| PadflowError::PadNotFound(PadRef::new(&self.node_id, id)))
    }

    /// Remaining sinks whose id starts with `prefix`.
    ///
    /// Shorter ids sort first, so `input_2` comes before `input_10`.
    pub fn take_sinks_with_prefix(&mut self, prefix: &str) -> Vec<SinkPad> {
        let mut ids: Vec<String> = self
            .sinks
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect();
        ids.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        ids.into_iter()
            .filter_map(|id| self.sinks.remove(&id))
            .collect()
    }

    /// Current value of any property pad of this node
    pub fn property(&self, id: &str) -> Option<Value> {
        self.properties
            .get(id)
            .and_then(PropertyCell::get)
            .filter(|v| !v.is_null())
    }

    pub fn property_as<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        match self.property(id) {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                PadflowError::InvalidPadValue {
                    pad: PadRef::new(&self.node_id, id),
                    message: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    pub fn property_cell(&self, id: &str) -> Option<PropertyCell> {
        self.properties.get(id).cloned()
    }

    pub fn services(&self) -> &ServiceExtensions {
        &self.services
    }

    /// Resolve the secret whose id is stored in property pad `id`
    pub async fn resolve_secret(&self, id: &str) -> Result<String> {
        let secret_id = self
            .property(id)
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| PadflowError::Secret(format!("no secret selected on {}.{}", self.node_id, id)))?;
        let provider = self
            .services
            .secrets()
            .ok_or_else(|| PadflowError::Secret("no secret provider configured".to_string()))?;
        provider.resolve_secret(&secret_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Completion;
    use crate::events::VecEventSink;
    use crate::services::StaticSecretProvider;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn source_with(
        targets: Vec<(PadRef, usize, Option<PropertyCell>)>,
        events: Arc<dyn EventSink>,
    ) -> (SourcePad, Vec<mpsc::Receiver<PadItem>>) {
        let mut endpoints = Vec::new();
        let mut receivers = Vec::new();
        for (target, capacity, retained) in targets {
            let (tx, rx) = mpsc::channel(capacity);
            endpoints.push(SinkEndpoint { target, tx, retained });
            receivers.push(rx);
        }
        let source = SourcePad::new(PadRef::new("src", "out"), PadKind::Stateless, None, endpoints, events);
        (source, receivers)
    }

    #[tokio::test]
    async fn test_fan_out_forks_per_sink() {
        let (source, mut receivers) = source_with(
            vec![
                (PadRef::new("a", "in"), 4, None),
                (PadRef::new("b", "in"), 4, None),
            ],
            Arc::new(VecEventSink::new()),
        );

        let root = RequestContext::new();
        assert_eq!(source.push_item(json!("hi"), &root), 2);
        root.complete();
        assert!(!root.is_done());

        for rx in receivers.iter_mut() {
            let item = rx.recv().await.unwrap();
            assert_eq!(item.value, json!("hi"));
            item.ctx.complete();
        }
        assert_eq!(root.outcome(), Some(Completion::Completed));
    }

    #[tokio::test]
    async fn test_unconnected_push_forks_nothing() {
        let (source, _) = source_with(Vec::new(), Arc::new(VecEventSink::new()));
        let root = RequestContext::new();
        assert_eq!(source.push_item(json!(1), &root), 0);
        root.complete();
        assert!(root.is_done());
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_completes_fork() {
        let events = Arc::new(VecEventSink::new());
        let cell = PropertyCell::new(None);
        let (source, _receivers) = source_with(
            vec![(PadRef::new("display", "value"), 1, Some(cell.clone()))],
            events.clone(),
        );

        let first = RequestContext::new();
        source.push_item(json!(1), &first);
        first.complete();

        let second = RequestContext::new();
        assert_eq!(source.push_item(json!(2), &second), 0);
        second.complete();

        // The dropped delivery does not hold the second context open
        assert!(second.is_done());
        assert!(!first.is_done());
        // Property sinks still see the newest value
        assert_eq!(cell.get(), Some(json!(2)));
        assert!(matches!(events.events()[0], GraphEvent::ItemDropped { .. }));
    }

    #[tokio::test]
    async fn test_dropped_sink_completes_unread_items() {
        let (tx, rx) = mpsc::channel(4);
        let sink = SinkPad::new(PadRef::new("display", "value"), rx, None);
        let source = SourcePad::new(
            PadRef::new("src", "out"),
            PadKind::Stateless,
            None,
            vec![SinkEndpoint {
                target: PadRef::new("display", "value"),
                tx,
                retained: None,
            }],
            Arc::new(VecEventSink::new()),
        );

        let root = RequestContext::new();
        assert_eq!(source.push_item(json!(1), &root), 1);
        root.complete();
        assert!(!root.is_done());

        drop(sink);
        assert_eq!(root.outcome(), Some(Completion::Completed));
    }

    #[tokio::test]
    async fn test_stateless_pads_reject_value_access() {
        let (source, _) = source_with(Vec::new(), Arc::new(VecEventSink::new()));
        assert_err!(source.get_value());
        assert_err!(source.set_value(json!(1)));

        let (_tx, rx) = mpsc::channel(1);
        let sink = SinkPad::new(PadRef::new("a", "in"), rx, Some(PropertyCell::new(Some(json!(true)))));
        assert_eq!(assert_ok!(sink.get_value()), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_resolve_secret() {
        let services = ServiceExtensions::new()
            .with_secrets(Arc::new(StaticSecretProvider::new().with_secret("openai", "OpenAI", "sk-1")));

        let mut io = NodeIo::new("llm".to_string(), Arc::new(services));
        io.add_property("api_key".to_string(), PropertyCell::new(Some(json!("openai"))));
        io.add_property("empty".to_string(), PropertyCell::new(None));

        assert_eq!(assert_ok!(io.resolve_secret("api_key").await), "sk-1");
        assert_err!(io.resolve_secret("empty").await);
    }

    #[test]
    fn test_take_sinks_with_prefix_sorted() {
        let mut io = NodeIo::new("join".to_string(), Arc::new(ServiceExtensions::new()));
        for id in ["input_10", "input_1", "input_0", "separator"] {
            let (_tx, rx) = mpsc::channel(1);
            io.add_sink(id.to_string(), SinkPad::new(PadRef::new("join", id), rx, None));
        }
        let taken = io.take_sinks_with_prefix("input_");
        let ids: Vec<_> = taken.iter().map(|s| s.pad().pad.clone()).collect();
        assert_eq!(ids, vec!["input_0", "input_1", "input_10"]);
        assert!(io.take_sink("separator").is_ok());
    }
}

//! Graph execution - one supervised task per node
//!
//! A [`GraphRuntime`] is built from a flattened, frozen copy of the graph.
//! Every sink pad gets a bounded queue, every source pad one sender per
//! connected sink, and every node's `run` is spawned into a `JoinSet`.
//!
//! The supervisor catches errors and panics per task. Under
//! [`RuntimeErrorPolicy::Isolate`] a failed node stops alone; under
//! [`RuntimeErrorPolicy::AbortGraph`] every other node is aborted too.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::{EngineConfig, RuntimeErrorPolicy};
use crate::constraint::{accepts_value, describe, Constraints};
use crate::context::RequestContext;
use crate::error::{PadflowError, Result};
use crate::events::{EventSink, GraphEvent};
use crate::extensions::ServiceExtensions;
use crate::graph::FlatGraph;
use crate::io::{NodeIo, PadItem, PropertyCell, SinkEndpoint, SinkPad, SourcePad};
use crate::node::NodeState;
use crate::pad::PadRef;
use crate::subgraph::parse_proxy_pad_id;

type TaskOutcome = std::result::Result<Result<()>, Box<dyn Any + Send>>;

struct RuntimeShared {
    run_id: String,
    sources: HashMap<PadRef, SourcePad>,
    properties: HashMap<PadRef, PropertyCell>,
    constraints: HashMap<PadRef, Constraints>,
    states: Mutex<HashMap<String, NodeState>>,
    failures: Mutex<HashMap<String, String>>,
}

/// Cloneable access to a running graph's pads and node states
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<RuntimeShared>,
}

impl RuntimeHandle {
    pub fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    /// Push `value` out of a source pad as if its node had produced it.
    ///
    /// Pads exposed by subgraph proxies may be addressed by their proxy id.
    pub fn push_value(&self, pad: &PadRef, value: Value, ctx: &RequestContext) -> Result<usize> {
        let pad = self.locate(pad)?;
        let source = self
            .shared
            .sources
            .get(&pad)
            .ok_or_else(|| PadflowError::InvalidConnection(format!("{} is not a source pad", pad)))?;

        if let Some(constraints) = self.shared.constraints.get(&pad) {
            if !accepts_value(constraints, &value) {
                return Err(PadflowError::InvalidPadValue {
                    message: format!("{} is not {}", value, describe(constraints)),
                    pad,
                });
            }
        }
        Ok(source.push_item(value, ctx))
    }

    /// Retained value of a property pad
    pub fn get_value(&self, pad: &PadRef) -> Result<Option<Value>> {
        let pad = self.locate(pad)?;
        self.shared
            .properties
            .get(&pad)
            .map(PropertyCell::get)
            .ok_or(PadflowError::NotAPropertyPad(pad))
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.shared.states.lock().get(node_id).copied()
    }

    /// Error message of a node whose run task failed
    pub fn failure(&self, node_id: &str) -> Option<String> {
        self.shared.failures.lock().get(node_id).cloned()
    }

    /// Map a possibly proxied address onto a runnable pad
    fn locate(&self, pad: &PadRef) -> Result<PadRef> {
        let mut current = pad.clone();
        loop {
            if self.shared.constraints.contains_key(&current) {
                return Ok(current);
            }
            match parse_proxy_pad_id(&current.pad) {
                Some(inner) => {
                    current = PadRef::new(format!("{}/{}", current.node, inner.node), inner.pad);
                }
                None => return Err(PadflowError::PadNotFound(pad.clone())),
            }
        }
    }
}

/// Give property sinks the retained value of their upstream property source.
///
/// Only direct links are seeded; a sink's value reaches further downstream
/// only when its node pushes it.
fn seed_linked_properties(
    links: &[(PadRef, PadRef)],
    properties: &HashMap<PadRef, PropertyCell>,
    constraints: &HashMap<PadRef, Constraints>,
) {
    for (source, sink) in links {
        let (Some(upstream), Some(cell)) = (properties.get(source), properties.get(sink)) else {
            continue;
        };
        let Some(value) = upstream.get() else { continue };
        let accepted = constraints
            .get(sink)
            .map(|c| accepts_value(c, &value))
            .unwrap_or(true);
        if accepted {
            log::trace!("Seeding {} from {}", sink, source);
            cell.set(value);
        } else {
            log::debug!("{} does not accept {} retained on {}", sink, value, source);
        }
    }
}

/// A running graph
pub struct GraphRuntime {
    handle: RuntimeHandle,
    supervisor: Option<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    auxiliary: Vec<JoinHandle<()>>,
}

impl GraphRuntime {
    pub(crate) fn start(
        graph: FlatGraph,
        config: &EngineConfig,
        services: Arc<ServiceExtensions>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| PadflowError::Config("graphs must be started inside a Tokio runtime".to_string()))?;
        config.validate()?;
        let run_id = uuid::Uuid::new_v4().to_string();

        let mut properties = HashMap::new();
        let mut constraints = HashMap::new();
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for node in &graph.nodes {
            for pad in &node.pads {
                let here = PadRef::new(&node.id, &pad.id);
                if pad.is_property() {
                    properties.insert(here.clone(), PropertyCell::new(pad.value.clone()));
                }
                if !pad.is_source() {
                    let (tx, rx) = mpsc::channel::<PadItem>(config.sink_queue_capacity);
                    senders.insert(here.clone(), tx);
                    receivers.insert(here.clone(), rx);
                }
                constraints.insert(here, pad.effective.clone());
            }
        }

        seed_linked_properties(&graph.links, &properties, &constraints);

        let mut endpoints: HashMap<PadRef, Vec<SinkEndpoint>> = HashMap::new();
        for (source, sink) in &graph.links {
            if let Some(tx) = senders.get(sink) {
                endpoints.entry(source.clone()).or_default().push(SinkEndpoint {
                    target: sink.clone(),
                    tx: tx.clone(),
                    retained: properties.get(sink).cloned(),
                });
            }
        }
        // Unconnected sinks see end-of-stream right away
        drop(senders);

        let mut sources = HashMap::new();
        let mut ios = Vec::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            let mut io = NodeIo::new(node.id.clone(), services.clone());
            for pad in &node.pads {
                let here = PadRef::new(&node.id, &pad.id);
                let retained = properties.get(&here).cloned();
                if let Some(cell) = &retained {
                    io.add_property(pad.id.clone(), cell.clone());
                }
                if pad.is_source() {
                    let source = SourcePad::new(
                        here.clone(),
                        pad.kind(),
                        retained,
                        endpoints.remove(&here).unwrap_or_default(),
                        events.clone(),
                    );
                    io.add_source(pad.id.clone(), source.clone());
                    sources.insert(here, source);
                } else if let Some(rx) = receivers.remove(&here) {
                    io.add_sink(pad.id.clone(), SinkPad::new(here, rx, retained));
                }
            }
            ios.push(io);
        }

        let shared = Arc::new(RuntimeShared {
            run_id: run_id.clone(),
            sources,
            properties,
            constraints,
            states: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        });

        let mut tasks = JoinSet::new();
        for (node, io) in graph.nodes.iter().zip(ios) {
            let node_id = node.id.clone();
            let plugin = node.node.clone();
            shared.states.lock().insert(node_id.clone(), NodeState::Running);
            emit(
                &events,
                GraphEvent::NodeStarted {
                    run_id: run_id.clone(),
                    node_id: node_id.clone(),
                },
            );
            tasks.spawn_on(
                async move {
                    let outcome = AssertUnwindSafe(plugin.run(io)).catch_unwind().await;
                    (node_id, outcome)
                },
                &runtime,
            );
        }
        log::info!("Started graph run {} with {} node(s)", run_id, graph.nodes.len());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor {
            shared: shared.clone(),
            events,
            policy: config.runtime_error_policy,
        };
        let supervisor = runtime.spawn(supervisor.run(tasks, shutdown_rx));

        Ok(Self {
            handle: RuntimeHandle { shared },
            supervisor: Some(supervisor),
            shutdown,
            auxiliary: Vec::new(),
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    pub fn run_id(&self) -> &str {
        self.handle.run_id()
    }

    /// Keep a helper task alive for as long as the graph runs
    pub(crate) fn attach_task(&mut self, task: JoinHandle<()>) {
        self.auxiliary.push(task);
    }

    /// Ask every node task to stop; does not wait
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait until every node task has ended
    pub async fn join(mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(e) = supervisor.await {
                log::error!("Graph supervisor for run {} failed: {}", self.run_id(), e);
            }
        }
        for task in self.auxiliary.drain(..) {
            task.abort();
        }
    }

    /// Stop every node task and wait for them to end
    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}

impl Drop for GraphRuntime {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        for task in &self.auxiliary {
            task.abort();
        }
    }
}

struct Supervisor {
    shared: Arc<RuntimeShared>,
    events: Arc<dyn EventSink>,
    policy: RuntimeErrorPolicy,
}

impl Supervisor {
    async fn run(self, mut tasks: JoinSet<(String, TaskOutcome)>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_ok() && !*shutdown.borrow() {
                        continue;
                    }
                    log::info!("Stopping graph run {}", self.shared.run_id);
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        self.record(joined);
                    }
                    break;
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    if self.record(joined) && self.policy == RuntimeErrorPolicy::AbortGraph {
                        log::error!("Aborting graph run {} after a node failure", self.shared.run_id);
                        tasks.abort_all();
                    }
                }
            }
        }

        // Aborted tasks carry no node id; whatever is still running was cancelled
        let cancelled: Vec<String> = {
            let mut states = self.shared.states.lock();
            states
                .iter_mut()
                .filter(|(_, state)| **state == NodeState::Running)
                .map(|(node_id, state)| {
                    *state = NodeState::Stopped;
                    node_id.clone()
                })
                .collect()
        };
        for node_id in cancelled {
            log::debug!("Node '{}' cancelled", node_id);
            self.stopped(node_id);
        }

        log::info!("Graph run {} stopped", self.shared.run_id);
        emit(
            &self.events,
            GraphEvent::GraphStopped {
                run_id: self.shared.run_id.clone(),
            },
        );
    }

    /// Record one finished task; true when it failed
    fn record(&self, joined: std::result::Result<(String, TaskOutcome), tokio::task::JoinError>) -> bool {
        let (node_id, outcome) = match joined {
            Ok(finished) => finished,
            Err(e) if e.is_cancelled() => return false,
            Err(e) => {
                log::error!("Node task in run {} could not be joined: {}", self.shared.run_id, e);
                return false;
            }
        };

        self.shared
            .states
            .lock()
            .insert(node_id.clone(), NodeState::Stopped);

        let message = match outcome {
            Ok(Ok(())) => {
                log::debug!("Node '{}' finished", node_id);
                self.stopped(node_id);
                return false;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };

        log::error!("Node '{}' failed: {}", node_id, message);
        self.shared
            .failures
            .lock()
            .insert(node_id.clone(), message.clone());
        emit(
            &self.events,
            GraphEvent::NodeFailed {
                run_id: self.shared.run_id.clone(),
                node_id,
                error: message,
            },
        );
        true
    }

    fn stopped(&self, node_id: String) {
        emit(
            &self.events,
            GraphEvent::NodeStopped {
                run_id: self.shared.run_id.clone(),
                node_id,
            },
        );
    }
}

fn emit(events: &Arc<dyn EventSink>, event: GraphEvent) {
    if let Err(e) = events.send(event) {
        log::trace!("Graph event not delivered: {}", e);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Completion;
    use crate::edit::GraphEdit;
    use crate::events::{ChannelEventSink, NullEventSink, VecEventSink};
    use crate::graph::Graph;
    use crate::testing;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn build(edits: Vec<GraphEdit>) -> Graph {
        let mut graph = testing::graph();
        for edit in edits {
            graph.apply_edit(edit).unwrap();
        }
        graph
    }

    #[tokio::test]
    async fn test_push_flows_to_collector() {
        let graph = build(vec![
            GraphEdit::insert("a", "Constant"),
            GraphEdit::insert("r", "Relay"),
            GraphEdit::insert("c", "Collector"),
            GraphEdit::connect("a", "value", "r", "input"),
            GraphEdit::connect("r", "output", "c", "input"),
        ]);
        let runtime = graph.start(ServiceExtensions::new(), Arc::new(NullEventSink)).unwrap();
        let handle = runtime.handle();

        let ctx = RequestContext::new();
        assert_eq!(assert_ok!(handle.push_value(&PadRef::new("a", "value"), json!(4), &ctx)), 1);
        ctx.complete();
        assert_eq!(ctx.done().await, Completion::Completed);

        assert_eq!(assert_ok!(handle.get_value(&PadRef::new("c", "last"))), Some(json!(4)));
        assert_eq!(assert_ok!(handle.get_value(&PadRef::new("a", "value"))), Some(json!(4)));
        assert_eq!(handle.node_state("r"), Some(NodeState::Running));

        runtime.shutdown().await;
        assert_eq!(handle.node_state("r"), Some(NodeState::Stopped));
    }

    #[tokio::test]
    async fn test_property_sinks_start_with_upstream_value() {
        let graph = build(vec![
            GraphEdit::insert("a", "Constant"),
            GraphEdit::insert("f", "Fanin"),
            GraphEdit::connect("a", "value", "f", "count"),
            GraphEdit::update_pad("a", "value", json!(3)),
        ]);

        let runtime = graph.start(ServiceExtensions::new(), Arc::new(NullEventSink)).unwrap();
        let handle = runtime.handle();
        assert_eq!(assert_ok!(handle.get_value(&PadRef::new("f", "count"))), Some(json!(3)));

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = EngineConfig {
            sink_queue_capacity: 0,
            ..EngineConfig::default()
        };
        let mut graph = Graph::new(testing::library(), config);
        graph.apply_edit(GraphEdit::insert("r", "Relay")).unwrap();

        let result = graph.start(ServiceExtensions::new(), Arc::new(NullEventSink));
        assert!(matches!(result, Err(PadflowError::Config(_))));
    }

    #[tokio::test]
    async fn test_handle_validates_addresses_and_values() {
        let graph = build(vec![
            GraphEdit::insert("a", "Constant"),
            GraphEdit::insert("r", "Relay"),
        ]);
        let runtime = graph.start(ServiceExtensions::new(), Arc::new(NullEventSink)).unwrap();
        let handle = runtime.handle();
        let ctx = RequestContext::new();

        assert!(matches!(
            handle.push_value(&PadRef::new("a", "missing"), json!(1), &ctx),
            Err(PadflowError::PadNotFound(_))
        ));
        assert!(matches!(
            handle.push_value(&PadRef::new("a", "value"), json!(-1), &ctx),
            Err(PadflowError::InvalidPadValue { .. })
        ));
        assert!(matches!(
            handle.get_value(&PadRef::new("r", "input")),
            Err(PadflowError::NotAPropertyPad(_))
        ));
        assert_err!(handle.push_value(&PadRef::new("r", "input"), json!(1), &ctx));

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let graph = build(vec![
            GraphEdit::insert("f", "Failing"),
            GraphEdit::insert("a", "Constant"),
        ]);
        let (sink, mut events) = ChannelEventSink::new();
        let runtime = graph.start(ServiceExtensions::new(), Arc::new(sink)).unwrap();
        let handle = runtime.handle();

        loop {
            match events.recv().await.unwrap() {
                GraphEvent::NodeFailed { node_id, error, .. } => {
                    assert_eq!(node_id, "f");
                    assert!(error.contains("boom"));
                    break;
                }
                GraphEvent::GraphStopped { .. } => panic!("graph stopped early"),
                _ => {}
            }
        }
        assert_eq!(handle.node_state("a"), Some(NodeState::Running));
        assert!(handle.failure("f").is_some());

        runtime.shutdown().await;
        let mut saw_stop = false;
        while let Ok(event) = events.try_recv() {
            saw_stop |= matches!(event, GraphEvent::GraphStopped { .. });
        }
        assert!(saw_stop);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_everything() {
        let config = EngineConfig {
            runtime_error_policy: RuntimeErrorPolicy::AbortGraph,
            ..EngineConfig::default()
        };
        let mut graph = Graph::new(testing::library(), config);
        graph.apply_edit(GraphEdit::insert("a", "Constant")).unwrap();
        graph.apply_edit(GraphEdit::insert("f", "Failing")).unwrap();

        let events = Arc::new(VecEventSink::new());
        let runtime = graph.start(ServiceExtensions::new(), events.clone()).unwrap();
        let handle = runtime.handle();
        runtime.join().await;

        assert_eq!(handle.node_state("a"), Some(NodeState::Stopped));
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, GraphEvent::NodeStopped { node_id, .. } if node_id == "a")));
    }

    #[tokio::test]
    async fn test_full_queue_drops_item() {
        let config = EngineConfig {
            sink_queue_capacity: 1,
            ..EngineConfig::default()
        };
        let mut graph = Graph::new(testing::library(), config);
        graph.apply_edit(GraphEdit::insert("a", "Constant")).unwrap();
        graph.apply_edit(GraphEdit::insert("f", "Fanin")).unwrap();
        // Fanin only drains input_0
        graph
            .apply_edit(GraphEdit::connect("a", "value", "f", "input_1"))
            .unwrap();

        let events = Arc::new(VecEventSink::new());
        let runtime = graph.start(ServiceExtensions::new(), events.clone()).unwrap();
        let handle = runtime.handle();
        let source = PadRef::new("a", "value");

        let first = RequestContext::new();
        assert_eq!(assert_ok!(handle.push_value(&source, json!(1), &first)), 1);
        let second = RequestContext::new();
        assert_eq!(assert_ok!(handle.push_value(&source, json!(2), &second)), 0);

        // The dropped delivery does not hold its root open
        second.complete();
        assert_eq!(second.done().await, Completion::Completed);
        assert!(!first.is_done());
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, GraphEvent::ItemDropped { sink, .. } if sink == "f.input_1")));

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_proxy_addresses_reach_inner_pads() {
        use crate::snapshot::{GraphSnapshot, NodeSnapshot};

        let mut graph = testing::graph();
        graph.apply_edit(GraphEdit::insert("c", "Collector")).unwrap();
        graph
            .apply_edit(GraphEdit::InsertInlineSubgraph {
                id: Some("sg".into()),
                subgraph_id: None,
                graph: GraphSnapshot {
                    nodes: vec![NodeSnapshot::new("k", "Constant")],
                },
                inbound_connections: vec![],
                outbound_connections: vec![crate::edit::PadConnection::new("k", "value", "c", "input")],
                remove_node_ids: vec![],
                editor_position: None,
                editor_name: None,
            })
            .unwrap();

        let runtime = graph.start(ServiceExtensions::new(), Arc::new(NullEventSink)).unwrap();
        let handle = runtime.handle();
        let ctx = RequestContext::new();
        assert_ok!(handle.push_value(&PadRef::new("sg", "k:value"), json!(9), &ctx));
        ctx.complete();
        ctx.done().await;

        assert_eq!(assert_ok!(handle.get_value(&PadRef::new("c", "last"))), Some(json!(9)));
        assert_eq!(
            assert_ok!(handle.get_value(&PadRef::new("sg/k", "value"))),
            Some(json!(9))
        );
        runtime.shutdown().await;
    }
}

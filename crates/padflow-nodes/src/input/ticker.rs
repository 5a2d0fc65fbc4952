//! Ticker node
//!
//! Emits a trigger on a fixed interval. Every tick starts a new root
//! context, so downstream completion is tracked per tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use padflow_engine::{
    Node, NodeIo, NodeMetadata, NodeView, PadSpec, RequestContext, Result, TypeConstraint,
};
use serde_json::json;
use tokio::task::JoinSet;

/// Shortest interval accepted on `interval_ms`
pub const MIN_INTERVAL_MS: i64 = 10;
const DEFAULT_INTERVAL_MS: i64 = 1000;

/// Ticker
///
/// # Pads
/// - `interval_ms` (property sink, Integer >= 10) - milliseconds between ticks
/// - `tick` (source, Trigger) - tick counter, starting at 1
pub struct Ticker;

impl Ticker {
    pub const PORT_INTERVAL: &'static str = "interval_ms";
    pub const PORT_TICK: &'static str = "tick";

    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }

    fn interval(io: &NodeIo) -> Duration {
        let ms = io
            .property_as::<i64>(Self::PORT_INTERVAL)
            .ok()
            .flatten()
            .unwrap_or(DEFAULT_INTERVAL_MS)
            .max(MIN_INTERVAL_MS);
        Duration::from_millis(ms as u64)
    }
}

#[async_trait]
impl Node for Ticker {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Ticker").tags(["input", "timing"])
    }

    fn description(&self) -> String {
        "Emits a trigger every interval".to_string()
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![
            PadSpec::property_sink(
                Self::PORT_INTERVAL,
                Some(vec![TypeConstraint::integer_range(Some(MIN_INTERVAL_MS), None)]),
            )
            .with_default(json!(DEFAULT_INTERVAL_MS)),
            PadSpec::stateless_source(Self::PORT_TICK, Some(vec![TypeConstraint::Trigger])),
        ])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let tick = io.source(Self::PORT_TICK)?;
        // The interval is read from the retained value before every tick
        let interval = io.take_sink(Self::PORT_INTERVAL)?;
        let mut background = JoinSet::new();
        background.spawn(interval.drain());

        let mut count: u64 = 0;
        loop {
            tokio::time::sleep(Self::interval(&io)).await;
            count += 1;

            let ctx = RequestContext::builder().originator(io.node_id()).build();
            let delivered = tick.push_item(json!(count), &ctx);
            ctx.complete();
            log::trace!("{}: tick {} reached {} sink(s)", io.node_id(), count, delivered);
        }
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "Ticker",
    create: Ticker::create,
});

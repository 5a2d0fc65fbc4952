//! Reading several sink pads from one loop

use padflow_engine::{PadItem, SinkPad};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Forward items from every sink into one queue, tagged with the sink's index.
///
/// The queue ends once every sink has ended. Dropping the returned
/// `JoinSet` stops the readers.
pub(crate) fn merge_sinks(sinks: Vec<SinkPad>) -> (mpsc::Receiver<(usize, PadItem)>, JoinSet<()>) {
    let (tx, rx) = mpsc::channel(sinks.len().max(1) * 4);
    let mut readers = JoinSet::new();
    for (index, mut sink) in sinks.into_iter().enumerate() {
        let tx = tx.clone();
        readers.spawn(async move {
            while let Some(item) = sink.next().await {
                if let Err(mpsc::error::SendError((_, item))) = tx.send((index, item)).await {
                    item.ctx.complete();
                    break;
                }
            }
        });
    }
    (rx, readers)
}

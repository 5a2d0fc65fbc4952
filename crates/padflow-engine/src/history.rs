//! Edit history using compressed graph snapshots
//!
//! The entry under the cursor is always the current graph. Each entry is
//! the snapshot JSON compressed with zstd, so deep histories of large
//! graphs stay cheap.

use std::collections::VecDeque;

use crate::error::{PadflowError, Result};
use crate::snapshot::GraphSnapshot;

const COMPRESSION_LEVEL: i32 = 3;

/// Bounded undo/redo history of graph snapshots
pub struct EditHistory {
    snapshots: VecDeque<Vec<u8>>,
    current: usize,
    depth: usize,
}

impl EditHistory {
    /// Create a history keeping at most `depth` snapshots
    pub fn new(depth: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: 0,
            depth: depth.max(1),
        }
    }

    /// Record a new current graph, discarding any redo entries
    pub fn push(&mut self, graph: &GraphSnapshot) -> Result<()> {
        let json = serde_json::to_vec(graph)?;
        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map_err(|e| PadflowError::Compression(e.to_string()))?;

        self.snapshots.truncate(self.current + 1);
        self.snapshots.push_back(compressed);
        self.current = self.snapshots.len() - 1;

        while self.snapshots.len() > self.depth {
            self.snapshots.pop_front();
            self.current = self.current.saturating_sub(1);
        }
        Ok(())
    }

    /// Step back; `None` at the oldest entry
    pub fn undo(&mut self) -> Option<Result<GraphSnapshot>> {
        if !self.can_undo() {
            return None;
        }
        self.current -= 1;
        Some(self.decompress(self.current))
    }

    /// Step forward; `None` at the newest entry
    pub fn redo(&mut self) -> Option<Result<GraphSnapshot>> {
        if !self.can_redo() {
            return None;
        }
        self.current += 1;
        Some(self.decompress(self.current))
    }

    pub fn current(&self) -> Option<Result<GraphSnapshot>> {
        if self.snapshots.is_empty() {
            None
        } else {
            Some(self.decompress(self.current))
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Total compressed size in bytes
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(Vec::len).sum()
    }

    fn decompress(&self, index: usize) -> Result<GraphSnapshot> {
        let json = zstd::decode_all(&self.snapshots[index][..])
            .map_err(|e| PadflowError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

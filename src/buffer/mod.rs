/// Gutter system: the write-behind buffering layer between the ingest path
/// and the worker pool. Producers hand in `(src, neighbor)` updates; the
/// system groups them by source vertex and emits batches to consumers,
/// delivering at most one batch per source at a time and per-source batches
/// in arrival order.
pub mod gutter_tree;
pub mod standalone;
pub mod work_queue;

use crate::core::errors::Result;
use crate::core::types::NodeId;

pub use gutter_tree::GutterTree;
pub use standalone::StandaloneGutters;
pub use work_queue::WorkQueue;

/// One flushed gutter: a source vertex and its buffered neighbors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBatch {
    pub src: NodeId,
    pub neighbors: Vec<NodeId>,
}

/// What a consumer gets back from `next_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchRequest {
    /// Work to do.
    Batch(NodeBatch),
    /// Nothing eligible and the queue is in non-blocking mode.
    Empty,
    /// The system was shut down; consumers should exit.
    Closed,
}

pub trait GutterSystem: Send + Sync {
    /// Buffer one update under `src`'s gutter. May emit a batch downstream
    /// when the gutter fills.
    fn insert(&self, src: NodeId, dst: NodeId) -> Result<()>;

    /// Push every buffered update downstream, regardless of fill level.
    fn force_flush(&self) -> Result<()>;

    /// Blocking in normal mode; returns `Empty` instead of blocking while
    /// non-blocking mode is set.
    fn next_batch(&self) -> BatchRequest;

    /// Release the per-source exclusivity claim taken by `next_batch`.
    fn batch_done(&self, src: NodeId);

    /// Toggle non-blocking mode; enabling it wakes blocked consumers.
    fn set_non_block(&self, non_block: bool);

    /// Shut the system down; all consumers see `Closed`.
    fn close(&self);
}

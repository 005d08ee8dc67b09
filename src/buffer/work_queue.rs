use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::buffer::{BatchRequest, NodeBatch};
use crate::core::types::NodeId;

/// Blocking multi-producer multi-consumer queue of vertex batches.
///
/// Guarantees consumed by the engine:
/// - at most one batch per source vertex is outstanding between
///   `pop` and `done` (a later batch for an in-flight source is skipped,
///   not reordered past other sources' work);
/// - batches for one source are delivered in push order;
/// - `set_non_block(true)` wakes every blocked consumer so the drain
///   protocol can observe an empty queue.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
    non_block: AtomicBool,
    closed: AtomicBool,
}

struct QueueState {
    queue: VecDeque<NodeBatch>,
    in_flight: HashSet<NodeId>,
}

impl WorkQueue {
    pub fn new() -> WorkQueue {
        WorkQueue {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                in_flight: HashSet::new(),
            }),
            cond: Condvar::new(),
            non_block: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push(&self, batch: NodeBatch) {
        let mut state = self.state.lock();
        state.queue.push_back(batch);
        drop(state);
        self.cond.notify_one();
    }

    pub fn pop(&self) -> BatchRequest {
        let mut state = self.state.lock();
        loop {
            if self.closed.load(Ordering::Acquire) {
                return BatchRequest::Closed;
            }
            // first batch whose source is not already claimed; scanning in
            // order keeps per-source delivery FIFO
            let eligible = state
                .queue
                .iter()
                .position(|batch| !state.in_flight.contains(&batch.src));
            if let Some(batch) = eligible.and_then(|pos| state.queue.remove(pos)) {
                state.in_flight.insert(batch.src);
                return BatchRequest::Batch(batch);
            }
            if self.non_block.load(Ordering::Acquire) {
                return BatchRequest::Empty;
            }
            self.cond.wait(&mut state);
        }
    }

    pub fn done(&self, src: NodeId) {
        let mut state = self.state.lock();
        state.in_flight.remove(&src);
        drop(state);
        // a queued batch for `src` may have become eligible
        self.cond.notify_all();
    }

    pub fn set_non_block(&self, non_block: bool) {
        self.non_block.store(non_block, Ordering::Release);
        if non_block {
            let _guard = self.state.lock();
            self.cond.notify_all();
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _guard = self.state.lock();
        self.cond.notify_all();
    }

    /// Queued batches plus outstanding claims; zero means fully drained.
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock();
        state.queue.len() + state.in_flight.len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

use parking_lot::Mutex;

use crate::buffer::work_queue::WorkQueue;
use crate::buffer::{BatchRequest, GutterSystem, NodeBatch};
use crate::core::errors::Result;
use crate::core::types::NodeId;

/// In-memory gutter system: one fixed-capacity buffer per vertex, flushed
/// to the shared work queue when it fills.
pub struct StandaloneGutters {
    gutters: Vec<Mutex<Vec<NodeId>>>,
    capacity: usize,
    queue: WorkQueue,
}

impl StandaloneGutters {
    pub fn new(num_nodes: NodeId, capacity: usize) -> StandaloneGutters {
        let gutters = (0..num_nodes)
            .map(|_| Mutex::new(Vec::with_capacity(capacity)))
            .collect();
        StandaloneGutters {
            gutters,
            capacity,
            queue: WorkQueue::new(),
        }
    }
}

impl GutterSystem for StandaloneGutters {
    fn insert(&self, src: NodeId, dst: NodeId) -> Result<()> {
        let mut gutter = self.gutters[src as usize].lock();
        gutter.push(dst);
        if gutter.len() >= self.capacity {
            let neighbors = std::mem::replace(&mut *gutter, Vec::with_capacity(self.capacity));
            // push while holding the gutter lock so concurrent producers
            // cannot reorder this source's batches
            self.queue.push(NodeBatch { src, neighbors });
        }
        Ok(())
    }

    fn force_flush(&self) -> Result<()> {
        for (src, gutter) in self.gutters.iter().enumerate() {
            let mut gutter = gutter.lock();
            if gutter.is_empty() {
                continue;
            }
            let neighbors = std::mem::replace(&mut *gutter, Vec::with_capacity(self.capacity));
            self.queue.push(NodeBatch { src: src as NodeId, neighbors });
        }
        Ok(())
    }

    fn next_batch(&self) -> BatchRequest {
        self.queue.pop()
    }

    fn batch_done(&self, src: NodeId) {
        self.queue.done(src);
    }

    fn set_non_block(&self, non_block: bool) {
        self.queue.set_non_block(non_block);
    }

    fn close(&self) {
        self.queue.close();
    }
}

/// Worker pool: fixed OS threads draining the gutter system into the
/// supernode table.
///
/// Each worker owns a scratch delta supernode, pulls one vertex batch at a
/// time, folds the batch into the scratch, and XORs the scratch into the
/// target supernode. The gutter system's per-source exclusivity means the
/// per-supernode lock is uncontended on this path.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::buffer::{BatchRequest, GutterSystem, NodeBatch};
use crate::core::types::{pairing_index, Edge, NodeId, VecIndex};
use crate::sketch::Supernode;

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    handles: Vec<JoinHandle<()>>,
}

struct PoolShared {
    supernodes: Arc<Vec<Mutex<Supernode>>>,
    gutters: Arc<dyn GutterSystem>,
    pause: AtomicBool,
    shutdown: AtomicBool,
    quiesced: Mutex<usize>,
    cond: Condvar,
    updates_applied: Arc<AtomicU64>,
    num_nodes: NodeId,
    seed: u64,
    fail_factor: u64,
}

impl WorkerPool {
    pub fn start(
        num_workers: usize,
        supernodes: Arc<Vec<Mutex<Supernode>>>,
        gutters: Arc<dyn GutterSystem>,
        num_nodes: NodeId,
        seed: u64,
        fail_factor: u64,
        updates_applied: Arc<AtomicU64>,
    ) -> WorkerPool {
        let shared = Arc::new(PoolShared {
            supernodes,
            gutters,
            pause: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            quiesced: Mutex::new(0),
            cond: Condvar::new(),
            updates_applied,
            num_nodes,
            seed,
            fail_factor,
        });
        let handles = (0..num_workers)
            .map(|id| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("gutter-worker-{}", id))
                    .spawn(move || worker_loop(shared))
                    .unwrap_or_else(|e| panic!("failed to spawn worker thread: {}", e))
            })
            .collect();
        WorkerPool { shared, handles }
    }

    /// Block until every worker has parked. The caller must first put the
    /// gutter system into non-blocking mode so workers can observe the
    /// drained queue instead of sleeping inside `next_batch`.
    pub fn pause(&self) {
        self.shared.pause.store(true, Ordering::Release);
        let mut quiesced = self.shared.quiesced.lock();
        while *quiesced < self.handles.len() {
            self.shared.cond.wait(&mut quiesced);
        }
        debug!("worker pool quiesced");
    }

    pub fn unpause(&self) {
        self.shared.pause.store(false, Ordering::Release);
        let _guard = self.shared.quiesced.lock();
        self.shared.cond.notify_all();
    }

    /// Signal shutdown and join. The gutter system must already be closed
    /// so blocked workers wake with `Closed`.
    pub fn stop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.pause.store(false, Ordering::Release);
        {
            let _guard = self.shared.quiesced.lock();
            self.shared.cond.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn num_workers(&self) -> usize {
        self.handles.len()
    }
}

fn worker_loop(shared: Arc<PoolShared>) {
    let mut scratch = Supernode::new(shared.num_nodes, shared.seed, shared.fail_factor);
    let mut update_buf: Vec<VecIndex> = Vec::new();
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        match shared.gutters.next_batch() {
            BatchRequest::Batch(batch) => {
                apply_batch(&shared, &mut scratch, &mut update_buf, batch);
            }
            BatchRequest::Closed => return,
            BatchRequest::Empty => {
                if shared.pause.load(Ordering::Acquire) {
                    park(&shared);
                } else {
                    // transient window around unpause before blocking mode
                    // is restored
                    std::thread::yield_now();
                }
            }
        }
    }
}

fn apply_batch(
    shared: &PoolShared,
    scratch: &mut Supernode,
    update_buf: &mut Vec<VecIndex>,
    batch: NodeBatch,
) {
    update_buf.clear();
    update_buf.extend(
        batch
            .neighbors
            .iter()
            .map(|&dst| pairing_index(Edge::new(batch.src, dst))),
    );
    scratch.populate_delta(update_buf);
    shared.supernodes[batch.src as usize].lock().apply_delta(scratch);
    shared
        .updates_applied
        .fetch_add(batch.neighbors.len() as u64, Ordering::Relaxed);
    shared.gutters.batch_done(batch.src);
}

fn park(shared: &PoolShared) {
    let mut quiesced = shared.quiesced.lock();
    *quiesced += 1;
    shared.cond.notify_all();
    while shared.pause.load(Ordering::Acquire) && !shared.shutdown.load(Ordering::Acquire) {
        shared.cond.wait(&mut quiesced);
    }
    *quiesced -= 1;
}

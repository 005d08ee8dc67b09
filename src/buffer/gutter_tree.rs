use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::buffer::work_queue::WorkQueue;
use crate::buffer::{BatchRequest, GutterSystem, NodeBatch};
use crate::core::errors::{ErrorCode, GraphError, Result};
use crate::core::types::NodeId;

/// Bytes a shard spill file may reach before it is regrouped into batches.
const SPILL_THRESHOLD_BYTES: u64 = 1 << 20;

/// Disk-backed gutter system: a two-level buffer tree.
///
/// Updates land in sharded in-memory root buffers covering contiguous
/// vertex ranges; a full root buffer is appended to its shard's spill file
/// as packed little-endian `(src, dst)` pairs. When a spill file crosses
/// its size threshold (or on `force_flush`) it is read back, grouped by
/// source vertex, and emitted to the work queue in source order. A vertex
/// maps to exactly one shard, so per-source batch order follows file order.
pub struct GutterTree {
    shards: Vec<Mutex<ShardState>>,
    nodes_per_shard: NodeId,
    buffer_capacity: usize,
    queue: WorkQueue,
}

struct ShardState {
    buffer: Vec<(NodeId, NodeId)>,
    path: PathBuf,
    file_len: u64,
}

impl GutterTree {
    pub fn new(
        directory: &std::path::Path,
        num_nodes: NodeId,
        num_shards: usize,
        buffer_capacity: usize,
    ) -> Result<GutterTree> {
        std::fs::create_dir_all(directory).map_err(|e| GraphError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("failed to create {}: {}", directory.display(), e),
        })?;
        let num_shards = num_shards.max(1).min(num_nodes as usize);
        let nodes_per_shard = num_nodes.div_ceil(num_shards as NodeId);
        let shards = (0..num_shards)
            .map(|i| {
                let path = directory.join(format!("gutter_shard_{}.data", i));
                // stale spill data from a previous run must not leak in
                File::create(&path).map_err(|e| GraphError::StorageError {
                    code: ErrorCode::StorageIOError,
                    message: format!("failed to create {}: {}", path.display(), e),
                })?;
                Ok(Mutex::new(ShardState { buffer: Vec::with_capacity(buffer_capacity), path, file_len: 0 }))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(num_shards, nodes_per_shard, "gutter tree initialized");
        Ok(GutterTree {
            shards,
            nodes_per_shard,
            buffer_capacity,
            queue: WorkQueue::new(),
        })
    }

    #[inline]
    fn shard_of(&self, src: NodeId) -> usize {
        (src / self.nodes_per_shard) as usize
    }

    /// Append the shard's root buffer to its spill file.
    fn spill(&self, state: &mut ShardState) -> Result<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new().append(true).open(&state.path).map_err(|e| {
            storage_error(&state.path, "open for append", e)
        })?;
        let mut bytes = Vec::with_capacity(state.buffer.len() * 16);
        for &(src, dst) in &state.buffer {
            bytes.extend_from_slice(&src.to_le_bytes());
            bytes.extend_from_slice(&dst.to_le_bytes());
        }
        file.write_all(&bytes).map_err(|e| storage_error(&state.path, "append", e))?;
        state.file_len += bytes.len() as u64;
        state.buffer.clear();
        Ok(())
    }

    /// Read the spill file back, group updates by source in file order, and
    /// emit the groups as batches.
    fn regroup(&self, state: &mut ShardState) -> Result<()> {
        if state.file_len == 0 {
            return Ok(());
        }
        let mut file = File::open(&state.path).map_err(|e| storage_error(&state.path, "open", e))?;
        let mut bytes = Vec::with_capacity(state.file_len as usize);
        file.read_to_end(&mut bytes).map_err(|e| storage_error(&state.path, "read", e))?;

        let mut groups: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for pair in bytes.chunks_exact(16) {
            let mut word = [0u8; 8];
            word.copy_from_slice(&pair[..8]);
            let src = u64::from_le_bytes(word);
            word.copy_from_slice(&pair[8..]);
            let dst = u64::from_le_bytes(word);
            groups.entry(src).or_default().push(dst);
        }
        for (src, neighbors) in groups {
            self.queue.push(NodeBatch { src, neighbors });
        }

        File::create(&state.path).map_err(|e| storage_error(&state.path, "truncate", e))?;
        state.file_len = 0;
        Ok(())
    }
}

fn storage_error(path: &std::path::Path, op: &str, e: std::io::Error) -> GraphError {
    error!(path = %path.display(), op, "gutter tree I/O failure: {}", e);
    GraphError::StorageError {
        code: ErrorCode::StorageIOError,
        message: format!("gutter tree {} failed for {}: {}", op, path.display(), e),
    }
}

impl GutterSystem for GutterTree {
    fn insert(&self, src: NodeId, dst: NodeId) -> Result<()> {
        let shard = self.shard_of(src);
        let mut state = self.shards[shard].lock();
        state.buffer.push((src, dst));
        if state.buffer.len() >= self.buffer_capacity {
            self.spill(&mut state)?;
            if state.file_len >= SPILL_THRESHOLD_BYTES {
                self.regroup(&mut state)?;
            }
        }
        Ok(())
    }

    fn force_flush(&self) -> Result<()> {
        for shard in &self.shards {
            let mut state = shard.lock();
            self.spill(&mut state)?;
            self.regroup(&mut state)?;
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

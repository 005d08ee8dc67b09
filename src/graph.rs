/// Graph facade and Borůvka driver.
///
/// The facade owns the supernode table, the DSU, the gutter system, and
/// the worker pool. Queries drain ingest (flush, then pause the pool),
/// run sampling/merging rounds over the current representatives, and in
/// resumable mode restore snapshotted supernodes before unlocking ingest.
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::buffer::{GutterSystem, GutterTree, StandaloneGutters};
use crate::core::config::{BufferingSystem, GraphConfig};
use crate::core::errors::{ErrorCode, GraphError, Result};
use crate::core::types::{edge_vector_len, Edge, GraphUpdate, NodeId};
use crate::dsu::DisjointSets;
use crate::sketch::{SampleResult, Supernode};
#[cfg(feature = "verify")]
use crate::verify::SampleVerifier;
use crate::worker::WorkerPool;

/// Process-wide guard: the sketch configuration (seed derivation, failure
/// factor, level count) is shared engine state, so only one graph may be
/// live at a time.
static GRAPH_OPEN: AtomicBool = AtomicBool::new(false);

const BACKUP_FILE_NAME: &str = "supernode_backup.data";

/// A connectivity partition: one vertex set per component, ordered by the
/// smallest member.
pub type ComponentPartition = Vec<BTreeSet<NodeId>>;

/// Ingest and query statistics.
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    /// Stream updates applied to supernodes by the worker pool.
    pub updates_applied: u64,
    /// Duration of the most recent drain (flush + worker quiescence).
    pub last_flush: Option<Duration>,
    /// Duration of the most recent Borůvka run.
    pub last_query: Option<Duration>,
}

#[derive(Default)]
struct Timings {
    last_flush: Option<Duration>,
    last_query: Option<Duration>,
}

pub struct Graph {
    num_nodes: NodeId,
    seed: u64,
    fail_factor: u64,
    snapshot_in_memory: bool,
    backup_path: PathBuf,
    supernodes: Arc<Vec<Mutex<Supernode>>>,
    dsu: Mutex<DisjointSets>,
    gutters: Arc<dyn GutterSystem>,
    workers: WorkerPool,
    update_locked: AtomicBool,
    updates_applied: Arc<AtomicU64>,
    timings: Mutex<Timings>,
    #[cfg(feature = "verify")]
    verifier: Mutex<Option<Box<dyn SampleVerifier>>>,
}

impl Graph {
    /// Build a fresh engine over `num_nodes` vertices with a random master
    /// seed.
    pub fn new(num_nodes: NodeId, config: GraphConfig) -> Result<Graph> {
        let seed = rand::thread_rng().gen();
        Self::build(num_nodes, seed, config, None)
    }

    /// Reconstruct an engine from a file written by `write_binary`. The
    /// serialized failure factor overrides the configured one.
    pub fn load_binary(path: &Path, mut config: GraphConfig) -> Result<Graph> {
        let file = File::open(path).map_err(|e| {
            error!(path = %path.display(), "failed to open graph file: {}", e);
            GraphError::StorageError {
                code: ErrorCode::StorageIOError,
                message: format!("failed to open {}: {}", path.display(), e),
            }
        })?;
        let mut reader = BufReader::new(file);
        let seed = read_u64(&mut reader)?;
        let num_nodes = read_u64(&mut reader)?;
        config.sketch_fail_factor = read_u64(&mut reader)?;
        Self::build(num_nodes, seed, config, Some(&mut reader))
    }

    fn build(
        num_nodes: NodeId,
        seed: u64,
        config: GraphConfig,
        reader: Option<&mut dyn Read>,
    ) -> Result<Graph> {
        config.validate()?;
        edge_vector_len(num_nodes)?;
        if GRAPH_OPEN
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GraphError::MultipleGraphs);
        }
        let result = Self::build_open(num_nodes, seed, config, reader);
        if result.is_err() {
            GRAPH_OPEN.store(false, Ordering::Release);
        }
        result
    }

    fn build_open(
        num_nodes: NodeId,
        seed: u64,
        config: GraphConfig,
        reader: Option<&mut dyn Read>,
    ) -> Result<Graph> {
        let fail_factor = config.sketch_fail_factor;
        let supernodes: Arc<Vec<Mutex<Supernode>>> = match reader {
            Some(mut reader) => Arc::new(
                (0..num_nodes)
                    .map(|_| {
                        Supernode::read_binary(num_nodes, seed, fail_factor, &mut reader)
                            .map(Mutex::new)
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => Arc::new(
                (0..num_nodes)
                    .map(|_| Mutex::new(Supernode::new(num_nodes, seed, fail_factor)))
                    .collect(),
            ),
        };

        let gutters: Arc<dyn GutterSystem> = match config.buffering_system {
            BufferingSystem::Standalone => {
                Arc::new(StandaloneGutters::new(num_nodes, config.gutter_capacity))
            }
            BufferingSystem::Tree => Arc::new(GutterTree::new(
                &config.disk_directory,
                num_nodes,
                config.num_workers * 4,
                config.gutter_capacity,
            )?),
        };

        let updates_applied = Arc::new(AtomicU64::new(0));
        let workers = WorkerPool::start(
            config.num_workers,
            Arc::clone(&supernodes),
            Arc::clone(&gutters),
            num_nodes,
            seed,
            fail_factor,
            Arc::clone(&updates_applied),
        );

        info!(
            num_nodes,
            workers = config.num_workers,
            buffering = ?config.buffering_system,
            snapshot_in_memory = config.snapshot_in_memory,
            "graph engine started"
        );

        Ok(Graph {
            num_nodes,
            seed,
            fail_factor,
            snapshot_in_memory: config.snapshot_in_memory,
            backup_path: config.disk_directory.join(BACKUP_FILE_NAME),
            supernodes,
            dsu: Mutex::new(DisjointSets::new(num_nodes)),
            gutters,
            workers,
            update_locked: AtomicBool::new(false),
            updates_applied,
            timings: Mutex::new(Timings::default()),
            #[cfg(feature = "verify")]
            verifier: Mutex::new(None),
        })
    }

    pub fn num_nodes(&self) -> NodeId {
        self.num_nodes
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stats(&self) -> GraphStats {
        let timings = self.timings.lock();
        GraphStats {
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            last_flush: timings.last_flush,
            last_query: timings.last_query,
        }
    }

    /// Install a cross-checker consulted on every sampled edge and closed
    /// component.
    #[cfg(feature = "verify")]
    pub fn set_verifier(&self, verifier: Box<dyn SampleVerifier>) {
        *self.verifier.lock() = Some(verifier);
    }

    /// Submit one stream update. Insert and delete toggle identically; the
    /// edge lands in both endpoints' gutters.
    pub fn update(&self, update: GraphUpdate) -> Result<()> {
        if self.update_locked.load(Ordering::Acquire) {
            return Err(GraphError::UpdateLocked);
        }
        let (src, dst) = (update.edge.src, update.edge.dst);
        if src == dst || src >= self.num_nodes || dst >= self.num_nodes {
            return Err(GraphError::InvalidEdge { src, dst });
        }
        self.gutters.insert(src, dst)?;
        self.gutters.insert(dst, src)?;
        Ok(())
    }

    /// Compute the connected components of the current net edge multiset.
    ///
    /// Drains ingest first, so every update submitted before this call is
    /// reflected. With `resumable` the mutated supernodes are snapshotted
    /// and restored, and ingest resumes before returning; without it the
    /// supernodes are consumed in place and the engine stays locked.
    pub fn connected_components(&self, resumable: bool) -> Result<ComponentPartition> {
        let flush_start = Instant::now();
        self.gutters.force_flush()?;
        self.gutters.set_non_block(true);
        self.workers.pause();
        self.update_locked.store(true, Ordering::Release);
        self.timings.lock().last_flush = Some(flush_start.elapsed());
        debug!(elapsed = ?flush_start.elapsed(), "ingest drained");

        let query_start = Instant::now();
        let mut dsu = self.dsu.lock();
        let result = self.boruvka_emulation(&mut dsu, resumable);

        if resumable && result.is_ok() {
            for supernode in self.supernodes.iter() {
                supernode.lock().reset_query_state();
            }
            dsu.reset();
            self.update_locked.store(false, Ordering::Release);
            self.gutters.set_non_block(false);
            self.workers.unpause();
        }
        drop(dsu);
        self.timings.lock().last_query = Some(query_start.elapsed());

        match &result {
            Ok(partition) => info!(
                components = partition.len(),
                elapsed = ?query_start.elapsed(),
                "connectivity query finished"
            ),
            Err(e) => error!("connectivity query failed: {}", e),
        }
        result
    }

    /// Serialize the engine: header (`seed`, `num_nodes`, `fail_factor`)
    /// followed by every supernode in vertex order. Ingest is drained
    /// first and resumes afterwards.
    pub fn write_binary(&self, path: &Path) -> Result<()> {
        self.gutters.force_flush()?;
        self.gutters.set_non_block(true);
        self.workers.pause();

        let result = self.write_supernodes(path);

        self.gutters.set_non_block(false);
        self.workers.unpause();
        result
    }

    fn write_supernodes(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| {
            error!(path = %path.display(), "failed to create graph file: {}", e);
            GraphError::StorageError {
                code: ErrorCode::StorageIOError,
                message: format!("failed to create {}: {}", path.display(), e),
            }
        })?;
        let mut writer = BufWriter::new(file);
        write_u64(&mut writer, self.seed)?;
        write_u64(&mut writer, self.num_nodes)?;
        write_u64(&mut writer, self.fail_factor)?;
        for supernode in self.supernodes.iter() {
            supernode.lock().write_binary(&mut writer)?;
        }
        writer.flush().map_err(|e| GraphError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("failed to flush {}: {}", path.display(), e),
        })?;
        info!(path = %path.display(), "graph serialized");
        Ok(())
    }

    /// Run sampling/merging rounds until a round changes nothing, then
    /// group vertices by DSU root.
    ///
    /// With `make_copy` the representatives surviving round-1 planning
    /// (exactly the supernodes any later round can mutate) are snapshotted
    /// before the first merge, and the snapshot is restored on every exit
    /// path, successful or not.
    fn boruvka_emulation(
        &self,
        dsu: &mut DisjointSets,
        make_copy: bool,
    ) -> Result<ComponentPartition> {
        dsu.reset();
        let mut reps: Vec<NodeId> = (0..self.num_nodes).collect();
        let mut first_round = true;
        let mut backed_up: Vec<NodeId> = Vec::new();
        let copy_supernodes: Vec<Mutex<Option<Supernode>>> = if make_copy && self.snapshot_in_memory
        {
            (0..self.num_nodes).map(|_| Mutex::new(None)).collect()
        } else {
            Vec::new()
        };
        let mut rounds = 0u32;

        let run = (|| -> Result<()> {
            loop {
                rounds += 1;
                let samples = self.sample_supernodes(&reps)?;
                let mut modified = false;
                let (new_reps, to_merge) = self.plan_merges(dsu, &reps, &samples, &mut modified)?;

                if make_copy && first_round {
                    backed_up = new_reps.clone();
                    if !self.snapshot_in_memory {
                        self.backup_to_disk(&backed_up)?;
                    }
                }
                let snapshot_now = make_copy && first_round && self.snapshot_in_memory;
                self.merge_supernodes(&new_reps, &to_merge, snapshot_now.then_some(&copy_supernodes[..]));

                debug!(round = rounds, reps = new_reps.len(), modified, "boruvka round complete");
                first_round = false;
                reps = new_reps;
                if !modified {
                    return Ok(());
                }
            }
        })();

        let restored = if make_copy {
            if self.snapshot_in_memory {
                self.restore_from_memory(&backed_up, &copy_supernodes);
                Ok(())
            } else {
                self.restore_from_disk(&backed_up)
            }
        } else {
            Ok(())
        };

        run?;
        restored?;

        let mut groups: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for v in 0..self.num_nodes {
            groups.entry(dsu.find(v)).or_default().insert(v);
        }
        Ok(groups.into_values().collect())
    }

    /// Round step 1: sample every representative in parallel, advancing
    /// each supernode's cursor one level. The first failure is returned
    /// after the barrier.
    fn sample_supernodes(&self, reps: &[NodeId]) -> Result<Vec<SampleResult>> {
        reps.par_iter()
            .map(|&r| self.supernodes[r as usize].lock().sample())
            .collect()
    }

    /// Round step 2 (single-threaded): turn samples into DSU unions and a
    /// per-root merge worklist, and decide who is still a representative.
    fn plan_merges(
        &self,
        dsu: &mut DisjointSets,
        reps: &[NodeId],
        samples: &[SampleResult],
        modified: &mut bool,
    ) -> Result<(Vec<NodeId>, Vec<Vec<NodeId>>)> {
        let mut to_merge: Vec<Vec<NodeId>> = vec![Vec::new(); self.num_nodes as usize];
        let mut retries: Vec<NodeId> = Vec::new();

        for (&r, sample) in reps.iter().zip(samples) {
            match *sample {
                SampleResult::Fail => {
                    // inconclusive level; this supernode retries next round
                    *modified = true;
                    retries.push(r);
                }
                SampleResult::Zero => {
                    // component closed
                    #[cfg(feature = "verify")]
                    self.check_verifier(|v| v.verify_cc(r, dsu.size_of(r)))?;
                }
                SampleResult::Edge(edge) => {
                    let a = dsu.find(edge.src);
                    let b = dsu.find(edge.dst);
                    if a == b {
                        continue;
                    }
                    #[cfg(feature = "verify")]
                    self.check_verifier(|v| v.verify_edge(edge))?;
                    let (root, child) = dsu.union_roots(a, b);
                    // the child's pending merges move with it
                    let absorbed = std::mem::take(&mut to_merge[child as usize]);
                    to_merge[root as usize].push(child);
                    to_merge[root as usize].extend(absorbed);
                    *modified = true;
                }
            }
        }

        // a retry whose root acquired pending merges will be merged anyway
        retries.retain(|&r| to_merge[r as usize].is_empty());
        let mut new_reps = retries;
        for v in 0..self.num_nodes {
            if !to_merge[v as usize].is_empty() {
                new_reps.push(v);
            }
        }
        Ok((new_reps, to_merge))
    }

    /// Round step 3: fold each root's merge list into its supernode in
    /// parallel. On a snapshotting round the destination is cloned before
    /// its first merge. Destinations are distinct and each child appears
    /// under exactly one root, so the lock sets are disjoint across tasks.
    fn merge_supernodes(
        &self,
        new_reps: &[NodeId],
        to_merge: &[Vec<NodeId>],
        copy_into: Option<&[Mutex<Option<Supernode>>]>,
    ) {
        new_reps.par_iter().for_each(|&a| {
            let list = &to_merge[a as usize];
            if copy_into.is_none() && list.is_empty() {
                return;
            }
            let mut dst = self.supernodes[a as usize].lock();
            if let Some(copies) = copy_into {
                *copies[a as usize].lock() = Some(dst.clone());
            }
            for &b in list {
                let mut src = self.supernodes[b as usize].lock();
                dst.merge(&src);
                src.mark_merged();
            }
        });
    }

    /// Serialize the snapshot set to the backup file, in list order.
    fn backup_to_disk(&self, ids: &[NodeId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let file = File::create(&self.backup_path).map_err(|e| {
            error!(path = %self.backup_path.display(), "failed to create backup: {}", e);
            GraphError::StorageError {
                code: ErrorCode::BackupFailed,
                message: format!("failed to create {}: {}", self.backup_path.display(), e),
            }
        })?;
        let mut writer = BufWriter::new(file);
        for &id in ids {
            self.supernodes[id as usize].lock().write_binary(&mut writer)?;
        }
        writer.flush().map_err(|e| {
            error!(path = %self.backup_path.display(), "failed to flush backup: {}", e);
            GraphError::StorageError {
                code: ErrorCode::BackupFailed,
                message: format!("failed to flush {}: {}", self.backup_path.display(), e),
            }
        })?;
        debug!(supernodes = ids.len(), path = %self.backup_path.display(), "snapshot written");
        Ok(())
    }

    /// Read the backup file back. `ids` must be the identical ordered list
    /// that drove `backup_to_disk`; the records carry no index.
    fn restore_from_disk(&self, ids: &[NodeId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let file = File::open(&self.backup_path).map_err(|e| {
            error!(path = %self.backup_path.display(), "failed to open backup: {}", e);
            GraphError::StorageError {
                code: ErrorCode::RestoreFailed,
                message: format!("failed to open {}: {}", self.backup_path.display(), e),
            }
        })?;
        let mut reader = BufReader::new(file);
        for &id in ids {
            let supernode =
                Supernode::read_binary(self.num_nodes, self.seed, self.fail_factor, &mut reader)?;
            *self.supernodes[id as usize].lock() = supernode;
        }
        debug!(supernodes = ids.len(), "snapshot restored from disk");
        Ok(())
    }

    /// Swap the in-memory clones back in, one pointer at a time.
    fn restore_from_memory(&self, ids: &[NodeId], copies: &[Mutex<Option<Supernode>>]) {
        for &id in ids {
            if let Some(copy) = copies[id as usize].lock().take() {
                *self.supernodes[id as usize].lock() = copy;
            }
        }
        if !ids.is_empty() {
            debug!(supernodes = ids.len(), "snapshot restored from memory");
        }
    }

    #[cfg(feature = "verify")]
    fn check_verifier(
        &self,
        f: impl FnOnce(&dyn SampleVerifier) -> Result<()>,
    ) -> Result<()> {
        match self.verifier.lock().as_deref() {
            Some(verifier) => f(verifier),
            None => Ok(()),
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.gutters.close();
        self.workers.stop();
        GRAPH_OPEN.store(false, Ordering::Release);
        debug!("graph engine shut down");
    }
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    writer
        .write_all(&value.to_le_bytes())
        .map_err(|e| GraphError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("header write error: {}", e),
        })
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|e| GraphError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("header read error: {}", e),
        })?;
    Ok(u64::from_le_bytes(buf))
}

/// Supernode: the bank of independent sketches carried by one vertex.
///
/// Each query round consumes one sketch level through the cursor; merging
/// component supernodes XORs the unconsumed levels so the survivor sketches
/// the union of the merged vertices' incidence vectors.
use std::io::{Read, Write};

use crate::core::errors::{GraphError, Result};
use crate::core::types::{edge_vector_len, unpair_index, Edge, NodeId, VecIndex};
use crate::sketch::bucket::{ceil_log2, hash64};
use crate::sketch::sketch::{Sketch, SketchSample};

/// Outcome of sampling a supernode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleResult {
    /// A (probably uniform) edge incident to this supernode's vertex set.
    Edge(Edge),
    /// The incidence vector is provably zero: the component is closed.
    Zero,
    /// Inconclusive this level; retry next round.
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Supernode {
    /// Vertex count of the owning graph, not this supernode's vertex id.
    n: NodeId,
    seed: u64,
    fail_factor: u64,
    /// Next sketch level to consume; `num_sketches` means exhausted.
    next_sketch: usize,
    /// Set once this supernode has been folded into another.
    merged: bool,
    sketches: Vec<Sketch>,
}

impl Supernode {
    /// Independent sketch levels per supernode. One level is consumed per
    /// Borůvka round; the active component count shrinks by at least 3/2
    /// per effective round, so `log_{3/2} n` levels cover the merge
    /// phase, plus slack for the closing zero round and inconclusive
    /// samples.
    pub fn num_sketches(n: NodeId) -> usize {
        let levels = ceil_log2(n) as f64 / (3f64.log2() - 1.0);
        levels.ceil() as usize + 2
    }

    /// Build an empty supernode. `n` must have passed `edge_vector_len`
    /// validation at graph construction.
    pub fn new(n: NodeId, seed: u64, fail_factor: u64) -> Supernode {
        debug_assert!(edge_vector_len(n).is_ok());
        let len = edge_vector_len(n).unwrap_or(1);
        let sketches = (0..Self::num_sketches(n))
            .map(|i| Sketch::new(len, sketch_seed(seed, i), fail_factor))
            .collect();
        Supernode {
            n,
            seed,
            fail_factor,
            next_sketch: 0,
            merged: false,
            sketches,
        }
    }

    /// Toggle one incidence-vector coordinate in every sketch level.
    pub fn update(&mut self, idx: VecIndex) {
        for sketch in &mut self.sketches {
            sketch.update(idx);
        }
    }

    /// Sample a random incident edge, consuming one sketch level.
    pub fn sample(&mut self) -> Result<SampleResult> {
        if self.next_sketch >= self.sketches.len() {
            return Err(GraphError::OutOfQueries);
        }
        let sample = self.sketches[self.next_sketch].sample()?;
        self.next_sketch += 1;
        Ok(match sample {
            SketchSample::Index(idx) => SampleResult::Edge(unpair_index(idx)),
            SketchSample::Zero => SampleResult::Zero,
            SketchSample::Fail => SampleResult::Fail,
        })
    }

    /// Fold another vertex set's supernode into this one. Only the levels
    /// this supernode has not yet consumed matter to future samples.
    pub fn merge(&mut self, other: &Supernode) {
        debug_assert_eq!(self.seed, other.seed);
        for i in self.next_sketch..self.sketches.len() {
            self.sketches[i].merge(&other.sketches[i]);
        }
    }

    /// Rebuild this supernode as the delta of one update batch: the state
    /// a fresh supernode would hold after applying `updates` in any order.
    pub fn populate_delta(&mut self, updates: &[VecIndex]) {
        for sketch in &mut self.sketches {
            sketch.clear();
        }
        for &idx in updates {
            self.update(idx);
        }
    }

    /// XOR a batch delta into this supernode across every level.
    /// `apply_delta(S, delta(batch))` equals folding `update` over the batch.
    pub fn apply_delta(&mut self, delta: &Supernode) {
        debug_assert_eq!(self.seed, delta.seed);
        for (mine, theirs) in self.sketches.iter_mut().zip(delta.sketches.iter()) {
            mine.merge(theirs);
        }
    }

    /// Rewind the query cursor; sketch contents are untouched.
    pub fn reset_query_state(&mut self) {
        self.next_sketch = 0;
        self.merged = false;
    }

    pub fn mark_merged(&mut self) {
        self.merged = true;
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    /// Vertex count of the graph this supernode belongs to.
    pub fn num_nodes(&self) -> NodeId {
        self.n
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn fail_factor(&self) -> u64 {
        self.fail_factor
    }

    /// Sketch levels consumed so far.
    pub fn levels_consumed(&self) -> usize {
        self.next_sketch
    }

    /// Concatenated sketch records; cursor state is not persisted.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> Result<()> {
        for sketch in &self.sketches {
            sketch.write_binary(writer)?;
        }
        Ok(())
    }

    pub fn read_binary<R: Read>(
        n: NodeId,
        seed: u64,
        fail_factor: u64,
        reader: &mut R,
    ) -> Result<Supernode> {
        let len = edge_vector_len(n)?;
        let sketches = (0..Self::num_sketches(n))
            .map(|i| Sketch::read_binary(len, sketch_seed(seed, i), fail_factor, reader))
            .collect::<Result<Vec<_>>>()?;
        Ok(Supernode {
            n,
            seed,
            fail_factor,
            next_sketch: 0,
            merged: false,
            sketches,
        })
    }
}

/// Per-level sketch seed. Levels mix in their index only: every vertex's
/// level-`i` sketch shares hash functions, which is what makes supernode
/// merge a meaningful XOR.
#[inline]
fn sketch_seed(master: u64, index: usize) -> u64 {
    hash64(index as u64 + 1, master)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::pairing_index;

    const N: NodeId = 16;
    const SEED: u64 = 0x5EED;
    const FAIL_FACTOR: u64 = 100;

    fn edge_idx(a: NodeId, b: NodeId) -> VecIndex {
        pairing_index(Edge::new(a, b))
    }

    #[test]
    fn test_fresh_supernode_samples_zero() {
        let mut sn = Supernode::new(N, SEED, FAIL_FACTOR);
        assert_eq!(sn.sample().unwrap(), SampleResult::Zero);
        assert_eq!(sn.levels_consumed(), 1);
    }

    #[test]
    fn test_single_edge_recovered() {
        let mut sn = Supernode::new(N, SEED, FAIL_FACTOR);
        sn.update(edge_idx(3, 7));
        assert_eq!(sn.sample().unwrap(), SampleResult::Edge(Edge::new(3, 7)));
    }

    #[test]
    fn test_cursor_exhaustion_is_out_of_queries() {
        let mut sn = Supernode::new(N, SEED, FAIL_FACTOR);
        for _ in 0..Supernode::num_sketches(N) {
            sn.sample().unwrap();
        }
        assert!(matches!(sn.sample(), Err(GraphError::OutOfQueries)));

        sn.reset_query_state();
        assert_eq!(sn.levels_consumed(), 0);
        assert_eq!(sn.sample().unwrap(), SampleResult::Zero);
    }

    #[test]
    fn test_delta_matches_individual_updates() {
        let batch = [edge_idx(0, 1), edge_idx(2, 5), edge_idx(0, 1), edge_idx(3, 9)];

        let mut direct = Supernode::new(N, SEED, FAIL_FACTOR);
        for &idx in &batch {
            direct.update(idx);
        }

        let mut delta = Supernode::new(N, SEED, FAIL_FACTOR);
        delta.populate_delta(&batch);
        let mut via_delta = Supernode::new(N, SEED, FAIL_FACTOR);
        via_delta.apply_delta(&delta);

        assert_eq!(direct, via_delta);
    }

    #[test]
    fn test_merge_cancels_shared_edge() {
        // {0,1} and {1,2}: the internal edge (0,1)+(0,1) cancels and the
        // merged supernode sees only the outgoing edge (1,2)
        let mut a = Supernode::new(N, SEED, FAIL_FACTOR);
        a.update(edge_idx(0, 1));
        let mut b = Supernode::new(N, SEED, FAIL_FACTOR);
        b.update(edge_idx(0, 1));
        b.update(edge_idx(1, 2));
        a.merge(&b);
        assert_eq!(a.sample().unwrap(), SampleResult::Edge(Edge::new(1, 2)));
    }

    #[test]
    fn test_merge_skips_consumed_levels() {
        let mut a = Supernode::new(N, SEED, FAIL_FACTOR);
        a.sample().unwrap();
        let consumed = a.levels_consumed();
        let mut b = Supernode::new(N, SEED, FAIL_FACTOR);
        b.update(edge_idx(4, 5));
        a.merge(&b);
        // level 0 was already consumed and stays untouched
        assert_eq!(a.sketches[..consumed], Supernode::new(N, SEED, FAIL_FACTOR).sketches[..consumed]);
        assert_eq!(a.sample().unwrap(), SampleResult::Edge(Edge::new(4, 5)));
    }

    #[test]
    fn test_binary_round_trip() {
        let mut sn = Supernode::new(N, SEED, FAIL_FACTOR);
        sn.update(edge_idx(1, 2));
        sn.update(edge_idx(8, 15));
        let mut bytes = Vec::new();
        sn.write_binary(&mut bytes).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        let restored = Supernode::read_binary(N, SEED, FAIL_FACTOR, &mut cursor).unwrap();
        assert_eq!(sn, restored);
    }

    #[test]
    fn test_merged_flag_round_trip() {
        let mut sn = Supernode::new(N, SEED, FAIL_FACTOR);
        assert!(!sn.is_merged());
        sn.mark_merged();
        assert!(sn.is_merged());
        sn.reset_query_state();
        assert!(!sn.is_merged());
    }
}

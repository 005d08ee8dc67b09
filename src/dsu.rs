/// Disjoint-set forest over dense vertex ids, with union-by-size and full
/// path compression.
///
/// The Borůvka planning pass reads parent pointers between rounds and
/// relies on them being flat after `find`, so compression rewrites the
/// whole path (halving would leave stale intermediate pointers). All calls
/// happen on the single-threaded planning pass; no synchronization here.
use crate::core::types::NodeId;

#[derive(Debug, Clone)]
pub struct DisjointSets {
    parent: Vec<NodeId>,
    size: Vec<NodeId>,
}

impl DisjointSets {
    pub fn new(num_nodes: NodeId) -> DisjointSets {
        DisjointSets {
            parent: (0..num_nodes).collect(),
            size: vec![1; num_nodes as usize],
        }
    }

    /// Representative of `v`'s set; rewrites every node on the path to
    /// point at the root.
    pub fn find(&mut self, v: NodeId) -> NodeId {
        let mut root = v;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cursor = v;
        while cursor != root {
            let next = self.parent[cursor as usize];
            self.parent[cursor as usize] = root;
            cursor = next;
        }
        root
    }

    /// Union two distinct roots by size. Returns `(root, child)`: the
    /// larger set's root survives, and on a size tie `a` stays root so the
    /// outcome is deterministic given the sample stream.
    pub fn union_roots(&mut self, a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        debug_assert_eq!(self.parent[a as usize], a);
        debug_assert_eq!(self.parent[b as usize], b);
        debug_assert_ne!(a, b);
        let (root, child) = if self.size[a as usize] < self.size[b as usize] {
            (b, a)
        } else {
            (a, b)
        };
        self.parent[child as usize] = root;
        self.size[root as usize] += self.size[child as usize];
        (root, child)
    }

    /// Vertices in the set rooted at `root`.
    pub fn size_of(&self, root: NodeId) -> NodeId {
        self.size[root as usize]
    }

    /// Back to all-singletons.
    pub fn reset(&mut self) {
        for (i, p) in self.parent.iter_mut().enumerate() {
            *p = i as NodeId;
        }
        for s in &mut self.size {
            *s = 1;
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_all_singletons() {
        let mut dsu = DisjointSets::new(5);
        for v in 0..5 {
            assert_eq!(dsu.find(v), v);
            assert_eq!(dsu.size_of(v), 1);
        }
    }

    #[test]
    fn test_union_by_size() {
        let mut dsu = DisjointSets::new(6);
        dsu.union_roots(0, 1);
        dsu.union_roots(0, 2);
        // {0,1,2} is larger, so 3 joins under 0
        let (root, child) = dsu.union_roots(3, 0);
        assert_eq!(root, 0);
        assert_eq!(child, 3);
        assert_eq!(dsu.size_of(0), 4);
    }

    #[test]
    fn test_equal_size_tie_keeps_first_root() {
        let mut dsu = DisjointSets::new(4);
        let (root, child) = dsu.union_roots(2, 1);
        assert_eq!(root, 2);
        assert_eq!(child, 1);
    }

    #[test]
    fn test_find_is_stable_and_idempotent() {
        let mut dsu = DisjointSets::new(8);
        dsu.union_roots(0, 1);
        dsu.union_roots(2, 3);
        dsu.union_roots(0, 2);
        for v in 0..4 {
            let root = dsu.find(v);
            assert_eq!(dsu.find(v), root);
            assert_eq!(dsu.find(root), root);
        }
    }

    #[test]
    fn test_path_compression_flattens_whole_path() {
        let mut dsu = DisjointSets::new(16);
        // hand-build the worst case: a 15-deep parent chain
        for v in 1..16u64 {
            dsu.parent[v as usize] = v - 1;
        }
        assert_eq!(dsu.find(15), 0);
        // one find rewrote every pointer on the path, not just alternates
        for v in 0..16 {
            assert_eq!(dsu.parent[v as usize], 0);
        }
    }

    #[test]
    fn test_reset_restores_singletons() {
        let mut dsu = DisjointSets::new(4);
        dsu.union_roots(0, 1);
        dsu.reset();
        for v in 0..4 {
            assert_eq!(dsu.find(v), v);
            assert_eq!(dsu.size_of(v), 1);
        }
    }
}

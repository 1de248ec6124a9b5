// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! Sync-coupled process partitioning via union-find.
//!
//! Methods linked by an *active* sync dependency edge end up on the same
//! worker thread: the sync edge then degenerates into a plain function-call
//! handoff inside that thread's layer loop, with no queueing involved.

use ahash::AHashMap;

use crate::method::DataMethod;

/// Identifies one process: a maximal set of methods connected by active
/// sync dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub(crate) u32);

struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n as u32).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: u32) -> u32 {
        if self.parent[x as usize] != x {
            let root = self.find(self.parent[x as usize]);
            self.parent[x as usize] = root;
        }
        self.parent[x as usize]
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra as usize].cmp(&self.rank[rb as usize]) {
            std::cmp::Ordering::Less => self.parent[ra as usize] = rb,
            std::cmp::Ordering::Greater => self.parent[rb as usize] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb as usize] = ra;
                self.rank[ra as usize] += 1;
            }
        }
    }
}

/// Partition `methods` into processes. Returns one [`ProcessId`] per
/// method, indexed positionally by `MethodId`. `ProcessId` values are
/// assigned in first-seen order over `methods`, so the result is stable
/// for a given method ordering.
pub fn partition(methods: &[DataMethod]) -> Vec<ProcessId> {
    let mut uf = UnionFind::new(methods.len());
    for (idx, method) in methods.iter().enumerate() {
        for (dep_id, cfg) in method.active_dependencies() {
            if cfg.sync {
                uf.union(idx as u32, dep_id.0);
            }
        }
    }

    let mut remap: AHashMap<u32, u32> = AHashMap::new();
    let mut result = Vec::with_capacity(methods.len());
    for idx in 0..methods.len() {
        let root = uf.find(idx as u32);
        let next_id = remap.len() as u32;
        let process_id = *remap.entry(root).or_insert(next_id);
        result.push(ProcessId(process_id));
    }
    result
}

//! Connected components of a body's surviving blocks.

use rapier2d::prelude::{Real, Vector};

/// Union-find over `0..n` with path compression and union by size.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Returns false if `a` and `b` were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }

    /// Members of each set, in order of each set's first member.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..n {
            let root = self.find(i);
            match slot_of_root[root] {
                Some(slot) => groups[slot].push(i),
                None => {
                    slot_of_root[root] = Some(groups.len());
                    groups.push(vec![i]);
                }
            }
        }
        groups
    }
}

/// Two block centres (body-local) share an edge: one axis a cell apart, the other aligned.
pub fn is_grid_adjacent(a: Vector<Real>, b: Vector<Real>) -> bool {
    let dx = (a.x - b.x).abs();
    let dy = (a.y - b.y).abs();
    let near = |d: f32| d > 0.5 && d < 1.1;
    (near(dx) && dy < 0.5) || (near(dy) && dx < 0.5)
}

/// Group block centres into edge-connected components, largest first.
/// Ties keep the order of each component's first block.
pub fn connected_components(centres: &[Vector<Real>]) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(centres.len());
    for i in 0..centres.len() {
        for j in i + 1..centres.len() {
            if is_grid_adjacent(centres[i], centres[j]) {
                sets.union(i, j);
            }
        }
    }
    let mut groups = sets.groups();
    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    groups
}

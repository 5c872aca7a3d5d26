/* =========================
 *   Union-Find
 * ========================= */

/// Equivalence classes of observation nodes, rebuilt from each model.
#[derive(Clone, Debug)]
pub struct Partition {
    p: Vec<usize>,
    sz: Vec<usize>,
}

impl Partition {
    pub fn new(n: usize) -> Self {
        Self {
            p: (0..n).collect(),
            sz: vec![1; n],
        }
    }

    pub fn len(&self) -> usize {
        self.p.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p.is_empty()
    }

    pub fn find(&mut self, x: usize) -> usize {
        if self.p[x] != x {
            let r = self.find(self.p[x]);
            self.p[x] = r;
        }
        self.p[x]
    }

    /// Root lookup for shared borrows; no path compression.
    pub fn root(&self, mut x: usize) -> usize {
        while self.p[x] != x {
            x = self.p[x];
        }
        x
    }

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn unite(&mut self, a: usize, b: usize) -> usize {
        let mut a = self.find(a);
        let mut b = self.find(b);
        if a == b {
            return a;
        }
        if self.sz[a] < self.sz[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.p[b] = a;
        self.sz[a] += self.sz[b];
        a
    }

    pub fn class_count(&self) -> usize {
        (0..self.p.len()).filter(|&x| self.p[x] == x).count()
    }

    /// Class id per node, numbered by each class's smallest member.
    pub fn canonical_ids(&self) -> Vec<usize> {
        let mut id_of_root = vec![usize::MAX; self.p.len()];
        let mut next = 0;
        let mut out = Vec::with_capacity(self.p.len());
        for x in 0..self.p.len() {
            let r = self.root(x);
            if id_of_root[r] == usize::MAX {
                id_of_root[r] = next;
                next += 1;
            }
            out.push(id_of_root[r]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unite_and_count() {
        let mut uf = Partition::new(5);
        assert_eq!(uf.class_count(), 5);
        uf.unite(0, 3);
        uf.unite(3, 4);
        assert!(uf.same(0, 4));
        assert!(!uf.same(1, 2));
        assert_eq!(uf.class_count(), 3);
        assert_eq!(uf.root(4), uf.find(0));
    }

    #[test]
    fn canonical_ids_follow_smallest_member() {
        let mut uf = Partition::new(5);
        uf.unite(4, 1);
        uf.unite(2, 0);
        assert_eq!(uf.canonical_ids(), vec![0, 1, 0, 2, 1]);
    }
}

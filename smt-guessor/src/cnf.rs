// cnf.rs
//
// DIMACS-style literals (non-zero i32, variables from 1), an append-only
// clause set and the cardinality encoding used for the leader count.

use std::ops::Not;

pub type Var = i32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lit(i32);

impl Lit {
    pub fn pos(v: Var) -> Self {
        debug_assert!(v > 0);
        Lit(v)
    }

    pub fn neg(v: Var) -> Self {
        debug_assert!(v > 0);
        Lit(-v)
    }

    pub fn var(self) -> Var {
        self.0.abs()
    }

    pub fn is_pos(self) -> bool {
        self.0 > 0
    }

    pub fn to_dimacs(self) -> i32 {
        self.0
    }
}

impl Not for Lit {
    type Output = Lit;

    fn not(self) -> Lit {
        Lit(-self.0)
    }
}

/// Fresh variable ids, shared by every encoder of one K-run.
#[derive(Debug, Default, Clone)]
pub struct VarPool {
    cnt: i32,
}

impl VarPool {
    pub fn new() -> Self {
        Self { cnt: 0 }
    }

    pub fn next(&mut self) -> Var {
        self.cnt += 1;
        self.cnt
    }

    pub fn max_var(&self) -> Var {
        self.cnt
    }
}

pub type Clause = Vec<Lit>;

/// Clauses only ever get appended; oracles rely on that to feed suffixes.
#[derive(Debug, Default, Clone)]
pub struct ClauseSet {
    clauses: Vec<Clause>,
}

impl ClauseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn unit(&mut self, lit: Lit) {
        self.clauses.push(vec![lit]);
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn as_slice(&self) -> &[Clause] {
        &self.clauses
    }

    /// Clauses appended since the set had `from` entries.
    pub fn since(&self, from: usize) -> &[Clause] {
        &self.clauses[from.min(self.clauses.len())..]
    }
}

/// Literal that may be a constant, as produced for the `i == j` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Term {
    True,
    Lit(Lit),
}

/// Collects a disjunction, folding away constant terms.
#[derive(Debug, Default)]
pub struct ClauseBuilder {
    lits: Vec<Lit>,
    satisfied: bool,
}

impl ClauseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `term` positively.
    pub fn holds(mut self, term: Term) -> Self {
        match term {
            Term::True => self.satisfied = true,
            Term::Lit(l) => self.lits.push(l),
        }
        self
    }

    /// Adds `¬term`.
    pub fn fails(mut self, term: Term) -> Self {
        if let Term::Lit(l) = term {
            self.lits.push(!l);
        }
        self
    }

    /// `None` when the clause is trivially true.
    pub fn build(self) -> Option<Clause> {
        if self.satisfied {
            None
        } else {
            Some(self.lits)
        }
    }
}

/// Encodes `sum(xs) == k` with a sequential counter.
///
/// Register `r[i][j]` is equivalent to "at least j+1 of xs[0..=i] are true";
/// only j <= min(i, k) is materialised, everything above is constant false.
pub fn exactly_k(clauses: &mut ClauseSet, pool: &mut VarPool, xs: &[Lit], k: usize) {
    let n = xs.len();
    if k == 0 {
        for &x in xs {
            clauses.unit(!x);
        }
        return;
    }
    if k > n {
        clauses.add(Vec::new());
        return;
    }

    let levels = k + 1;
    let mut prev: Vec<Lit> = Vec::new();
    for (i, &x) in xs.iter().enumerate() {
        let width = (i + 1).min(levels);
        let mut row = Vec::with_capacity(width);
        for j in 0..width {
            let r = Lit::pos(pool.next());
            let same = prev.get(j).copied();
            // register below: j == 0 means "at least 0", which is constant true
            let lower = if j == 0 { None } else { prev.get(j - 1).copied() };

            if let Some(p) = same {
                clauses.add(vec![!p, r]);
            }
            match (j, lower) {
                (0, _) => clauses.add(vec![!x, r]),
                (_, Some(q)) => clauses.add(vec![!q, !x, r]),
                (_, None) => {}
            }
            if j > 0 {
                let mut back = vec![!r];
                back.extend(same);
                back.extend(lower);
                clauses.add(back);
            }
            let mut back = vec![!r, x];
            back.extend(same);
            clauses.add(back);

            row.push(r);
        }
        prev = row;
    }

    clauses.unit(prev[k - 1]);
    if let Some(&over) = prev.get(k) {
        clauses.unit(!over);
    }
}

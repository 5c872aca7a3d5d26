// oracle.rs
//
// The satisfiability oracle seam. The refinement loop only ever calls
// `solve` with the clause set it has accumulated so far.

use crate::cnf::{ClauseSet, Lit, Term, Var};
use crate::equiv_vars::EquivVars;

/// Dense assignment; index 0 is unused, unassigned variables read false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    values: Vec<bool>,
}

impl Model {
    pub fn from_values(values: Vec<bool>) -> Self {
        Self { values }
    }

    pub fn var(&self, v: Var) -> bool {
        self.values.get(v as usize).copied().unwrap_or(false)
    }

    pub fn lit(&self, l: Lit) -> bool {
        self.var(l.var()) == l.is_pos()
    }

    pub fn term(&self, t: Term) -> bool {
        match t {
            Term::True => true,
            Term::Lit(l) => self.lit(l),
        }
    }

    /// Value of `Eq(i,j)`; pairs never materialised count as false.
    pub fn equiv(&self, vars: &EquivVars, i: usize, j: usize) -> bool {
        vars.peek(i, j).is_some_and(|t| self.term(t))
    }
}

#[derive(Debug, Clone)]
pub enum Verdict {
    Sat(Model),
    Unsat,
    /// Resource limit hit before a definite answer.
    Unknown,
}

/// `solve(clauses) -> SAT(model) | UNSAT | UNKNOWN`.
///
/// Within one K-run every call gets an extension of the previous clause set,
/// so implementations may keep state and only load the new suffix. Use a
/// fresh oracle per K-run.
pub trait Oracle {
    fn solve(&mut self, clauses: &ClauseSet) -> Verdict;
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn solve(&mut self, clauses: &ClauseSet) -> Verdict {
        (**self).solve(clauses)
    }
}

/// CaDiCaL, fed incrementally.
pub struct CadicalOracle {
    sat: cadical::Solver,
    fed: usize,
    max_var: Var,
    conflict_limit: Option<i32>,
}

impl CadicalOracle {
    pub fn new(conflict_limit: Option<i32>) -> Self {
        Self {
            sat: cadical::Solver::new(),
            fed: 0,
            max_var: 0,
            conflict_limit,
        }
    }
}

impl Oracle for CadicalOracle {
    fn solve(&mut self, clauses: &ClauseSet) -> Verdict {
        debug_assert!(clauses.len() >= self.fed, "clause set shrank between calls");
        for clause in clauses.since(self.fed) {
            for l in clause {
                self.max_var = self.max_var.max(l.var());
            }
            self.sat.add_clause(clause.iter().map(|l| l.to_dimacs()));
        }
        self.fed = clauses.len();

        if let Some(limit) = self.conflict_limit {
            if let Err(e) = self.sat.set_limit("conflicts", limit) {
                tracing::warn!("cadical rejected conflict limit {}: {:?}", limit, e);
            }
        }

        match self.sat.solve() {
            Some(true) => {
                let mut values = vec![false; self.max_var as usize + 1];
                for v in 1..=self.max_var {
                    values[v as usize] = self.sat.value(v) == Some(true);
                }
                Verdict::Sat(Model::from_values(values))
            }
            Some(false) => Verdict::Unsat,
            None => Verdict::Unknown,
        }
    }
}

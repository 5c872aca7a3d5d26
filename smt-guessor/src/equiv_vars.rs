use std::collections::HashMap;

use crate::cnf::{Lit, Term, Var, VarPool};

/// `Eq(i,j)` variables: "node i and node j are the same room".
///
/// Allocated on first use and keyed by the canonical pair (min, max); the
/// diagonal is the constant `True` and never gets a variable.
#[derive(Debug, Default, Clone)]
pub struct EquivVars {
    vars: HashMap<(usize, usize), Var>,
}

impl EquivVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, pool: &mut VarPool, i: usize, j: usize) -> Term {
        if i == j {
            return Term::True;
        }
        let key = if i < j { (i, j) } else { (j, i) };
        let v = *self.vars.entry(key).or_insert_with(|| pool.next());
        Term::Lit(Lit::pos(v))
    }

    /// Lookup without allocating; `None` for a pair nobody asked about.
    pub fn peek(&self, i: usize, j: usize) -> Option<Term> {
        if i == j {
            return Some(Term::True);
        }
        let key = if i < j { (i, j) } else { (j, i) };
        self.vars.get(&key).map(|&v| Term::Lit(Lit::pos(v)))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// All materialised pairs as ((i, j), var) with i < j.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), Var)> + '_ {
        self.vars.iter().map(|(&k, &v)| (k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_unordered_and_lazy() {
        let mut pool = VarPool::new();
        let mut vars = EquivVars::new();
        assert!(vars.is_empty());

        let a = vars.get(&mut pool, 3, 1);
        let b = vars.get(&mut pool, 1, 3);
        assert_eq!(a, b);
        assert_eq!(vars.len(), 1);
        assert_eq!(pool.max_var(), 1);

        let c = vars.get(&mut pool, 1, 2);
        assert_ne!(a, c);
        assert_eq!(vars.iter().count(), 2);
        assert!(vars.iter().all(|((i, j), _)| i < j));
    }

    #[test]
    fn diagonal_is_constant_true() {
        let mut pool = VarPool::new();
        let mut vars = EquivVars::new();
        assert_eq!(vars.get(&mut pool, 4, 4), Term::True);
        assert_eq!(pool.max_var(), 0);
        assert_eq!(vars.peek(2, 2), Some(Term::True));
        assert_eq!(vars.peek(0, 2), None);
    }
}
